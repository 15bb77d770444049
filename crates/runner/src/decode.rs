/// Incremental UTF-8 decoder for byte streams.
///
/// Multi-byte sequences split across chunk boundaries are held back until the
/// rest arrives. Invalid bytes decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
	pending: Vec<u8>,
}

impl Utf8StreamDecoder {
	/// Creates a decoder with nothing buffered.
	pub fn new() -> Self {
		Self::default()
	}

	/// Decodes as much of `bytes` (plus any carried-over tail) as possible.
	pub fn push(&mut self, bytes: &[u8]) -> String {
		self.pending.extend_from_slice(bytes);
		let mut out = String::new();
		let mut start = 0;
		loop {
			match std::str::from_utf8(&self.pending[start..]) {
				Ok(valid) => {
					out.push_str(valid);
					start = self.pending.len();
					break;
				}
				Err(err) => {
					let valid_end = start + err.valid_up_to();
					out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
					match err.error_len() {
						Some(len) => {
							out.push(char::REPLACEMENT_CHARACTER);
							start = valid_end + len;
						}
						None => {
							start = valid_end;
							break;
						}
					}
				}
			}
		}
		self.pending.drain(..start);
		out
	}

	/// Flushes whatever is still buffered at end of stream.
	pub fn finish(&mut self) -> String {
		let tail = String::from_utf8_lossy(&self.pending).into_owned();
		self.pending.clear();
		tail
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn split_multibyte_sequence_is_carried_over() {
		let bytes = "héllo → wörld".as_bytes();
		let mut decoder = Utf8StreamDecoder::new();
		let mut out = String::new();
		for chunk in bytes.chunks(1) {
			out.push_str(&decoder.push(chunk));
		}
		out.push_str(&decoder.finish());
		assert_eq!(out, "héllo → wörld");
	}

	#[test]
	fn invalid_bytes_become_replacement_characters() {
		let mut decoder = Utf8StreamDecoder::new();
		assert_eq!(decoder.push(b"ok\xffok"), "ok\u{fffd}ok");
	}

	#[test]
	fn truncated_tail_is_flushed_lossily() {
		let mut decoder = Utf8StreamDecoder::new();
		assert_eq!(decoder.push(&[b'a', 0xe2, 0x86]), "a");
		assert_eq!(decoder.finish(), "\u{fffd}");
		assert_eq!(decoder.finish(), "");
	}
}
