//! Starter files per language.

use cannon_primitives::FileStore;
use cannon_runner::{Error, Language};
use indexmap::IndexMap;

/// Starter files plus the output a first run is expected to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
	/// `path -> content`.
	pub files: IndexMap<String, String>,
	/// Output shown before the first run.
	pub output: Option<String>,
}

impl Template {
	/// Files as a clean store.
	pub fn file_store(&self) -> FileStore {
		self.files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect()
	}
}

/// Template for `language`. Languages without one are a configuration error.
pub fn template(language: Language) -> Result<Template, Error> {
	match language {
		Language::Rust => Ok(rust()),
		Language::Go => Ok(go()),
		Language::Javascript => Ok(javascript()),
		Language::Python => Ok(python()),
		other => Err(Error::Config(format!("no template for language `{other}`"))),
	}
}

fn files<const N: usize>(entries: [(&str, &str); N]) -> IndexMap<String, String> {
	entries
		.into_iter()
		.map(|(path, content)| (path.to_string(), content.to_string()))
		.collect()
}

fn rust() -> Template {
	Template {
		files: files([
			("src/main.rs", "fn main() {\n    println!(\"Hello, world!\");\n}\n"),
			(
				"Cargo.toml",
				"[package]\nname = \"hello_world\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
			),
		]),
		output: Some(
			"stderr:   Compiling hello_world v0.1.0 (/playground)\n\
			 stderr:   Finished dev [unoptimized + debuginfo] target(s) in 0.31s\n\
			 stderr:   Running `/playground/target/debug/hello_world`\n\
			 Hello, world!\n"
				.to_string(),
		),
	}
}

fn go() -> Template {
	Template {
		files: files([
			(
				"main.go",
				"package main\n\nimport (\n\t\"fmt\"\n\n\t\"github.com/google/uuid\"\n)\n\nfunc main() {\n\tid := uuid.New()\n\tfmt.Printf(\"Generated UUID: %s\\n\", id.String())\n}\n",
			),
			(
				"go.mod",
				"module hello_world\n\ngo 1.18\n\nrequire github.com/google/uuid v1.3.0\n",
			),
		]),
		output: None,
	}
}

const PACKAGE_JSON: &str = r#"{
  "name": "hello-react",
  "version": "0.1.0",
  "private": true,
  "dependencies": {
    "react": "^18.2.0",
    "react-dom": "^18.2.0",
    "react-scripts": "5.0.1"
  },
  "scripts": {
    "start": "react-scripts start",
    "build": "react-scripts build"
  }
}
"#;

const APP_JS: &str = r#"function App() {
  console.log("Hello world!");
  return (
    <div>
      <h2 className="gradient-text">Hello, world!</h2>
    </div>
  );
}

export default App;
"#;

const INDEX_JS: &str = r#"import React from 'react';
import ReactDOM from 'react-dom/client';
import './index.css';
import App from './App';

const root = ReactDOM.createRoot(document.getElementById('root'));
root.render(
  <React.StrictMode>
    <App />
  </React.StrictMode>
);
"#;

const INDEX_HTML: &str = r#"<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>React App</title>
  </head>
  <body>
    <noscript>You need to enable JavaScript to run this app.</noscript>
    <div id="root"></div>
  </body>
</html>
"#;

const INDEX_CSS: &str = r#".gradient-text {
  background-clip: text;
  color: transparent;
  background-image: linear-gradient(to bottom right, #f80531, #36041d);
}
"#;

fn javascript() -> Template {
	Template {
		files: files([
			("/package.json", PACKAGE_JSON),
			("/src/App.js", APP_JS),
			("/src/index.js", INDEX_JS),
			("/public/index.html", INDEX_HTML),
			("/src/index.css", INDEX_CSS),
		]),
		output: None,
	}
}

fn python() -> Template {
	Template {
		files: files([("main.py", "print(\"Hello, world!\")\n")]),
		output: None,
	}
}
