//! NDJSON streaming response parser for the chat endpoint.
//!
//! Reads a `reqwest::Response` as a byte stream, splits it on line
//! boundaries, parses each line as a `ChatChunk`, and yields the content
//! fragments in order until the runtime reports `done`.

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::ChatChunk;

/// Parse raw NDJSON bytes into content fragments.
///
/// Each yielded item is one incremental text fragment. Empty fragments
/// (keep-alives, tool-call-only chunks) are skipped. The stream ends when the
/// runtime sends a chunk with `done: true`; any content on that final chunk
/// is still yielded first.
pub fn parse_chat_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, InferenceError>> {
    let byte_stream = response.bytes_stream();

    stream::unfold(
        (byte_stream, String::new(), false),
        |(mut byte_stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                // Drain complete lines from the buffer first.
                if let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    match parse_chunk_line(&line) {
                        Ok(None) => continue, // blank line or empty fragment
                        Ok(Some((content, done))) => {
                            if content.is_empty() {
                                if done {
                                    return None;
                                }
                                continue;
                            }
                            return Some((Ok(content), (byte_stream, buffer, done)));
                        }
                        Err(e) => return Some((Err(e), (byte_stream, buffer, true))),
                    }
                }

                // Need more data from the socket.
                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, buffer, true),
                        ));
                    }
                    None => {
                        // Stream ended — a final line may lack its newline.
                        let line = buffer.trim().to_string();
                        buffer.clear();
                        if line.is_empty() {
                            return None;
                        }
                        return match parse_chunk_line(&line) {
                            Ok(Some((content, _))) if !content.is_empty() => {
                                Some((Ok(content), (byte_stream, buffer, true)))
                            }
                            Ok(_) => None,
                            Err(e) => Some((Err(e), (byte_stream, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

/// Parse one NDJSON line into `(content, done)`.
///
/// Returns `Ok(None)` for blank lines.
fn parse_chunk_line(line: &str) -> Result<Option<(String, bool)>, InferenceError> {
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk =
        serde_json::from_str(line).map_err(|e| InferenceError::StreamError {
            reason: format!("failed to parse stream chunk: {e} (line: {line})"),
        })?;

    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok(Some((content, chunk.done)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_yields_nothing() {
        assert!(parse_chunk_line("").unwrap().is_none());
    }

    #[test]
    fn content_chunk_parses() {
        let line = r#"{"message":{"role":"assistant","content":"Hello"},"done":false}"#;
        let (content, done) = parse_chunk_line(line).unwrap().unwrap();
        assert_eq!(content, "Hello");
        assert!(!done);
    }

    #[test]
    fn done_chunk_without_content() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":true}"#;
        let (content, done) = parse_chunk_line(line).unwrap().unwrap();
        assert!(content.is_empty());
        assert!(done);
    }

    #[test]
    fn done_chunk_with_trailing_content() {
        let line = r#"{"message":{"role":"assistant","content":"!"},"done":true}"#;
        let (content, done) = parse_chunk_line(line).unwrap().unwrap();
        assert_eq!(content, "!");
        assert!(done);
    }

    #[test]
    fn malformed_line_is_a_stream_error() {
        let err = parse_chunk_line("{not json").unwrap_err();
        assert!(matches!(err, InferenceError::StreamError { .. }));
    }

    #[test]
    fn chunk_without_message_is_empty() {
        let line = r#"{"done":false}"#;
        let (content, done) = parse_chunk_line(line).unwrap().unwrap();
        assert!(content.is_empty());
        assert!(!done);
    }
}
