//! Minimal Server-Sent Events decoder for streaming LLM responses.
//!
//! Turns a byte stream into the payloads of its `data:` lines. Lines are
//! split on raw bytes before UTF-8 decoding so a multi-byte character
//! spanning two network reads is never mangled.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::stream::{self, BoxStream, Stream, StreamExt};

use super::BackendError;

struct Decoder {
    inner: BoxStream<'static, Result<Vec<u8>, String>>,
    buf: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl Decoder {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.strip_prefix(' ').unwrap_or(data);
                self.pending.push_back(data.to_string());
            }
        }
    }
}

/// Yields the payload of every `data:` line in `bytes`.
///
/// A read error ends the stream with [`BackendError::Failed`].
pub fn data_payloads<S, B, E>(bytes: S) -> BoxStream<'static, Result<String, BackendError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: Display,
{
    let inner = bytes
        .map(|item| item.map(|b| b.as_ref().to_vec()).map_err(|e| e.to_string()))
        .boxed();
    let decoder = Decoder {
        inner,
        buf: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(decoder, |mut dec| async move {
        loop {
            if let Some(payload) = dec.pending.pop_front() {
                return Some((Ok(payload), dec));
            }
            if dec.done {
                return None;
            }
            match dec.inner.next().await {
                Some(Ok(bytes)) => {
                    dec.buf.extend_from_slice(&bytes);
                    dec.drain_lines();
                }
                Some(Err(e)) => {
                    dec.done = true;
                    return Some((
                        Err(BackendError::Failed(format!("stream read failed: {}", e))),
                        dec,
                    ));
                }
                None => {
                    dec.done = true;
                    if !dec.buf.is_empty() {
                        dec.buf.push(b'\n');
                        dec.drain_lines();
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: Vec<&[u8]>) -> impl Stream<Item = Result<Vec<u8>, String>> + Send + 'static {
        let owned: Vec<Result<Vec<u8>, String>> = parts.into_iter().map(|p| Ok(p.to_vec())).collect();
        stream::iter(owned)
    }

    #[tokio::test]
    async fn test_extracts_data_lines_across_reads() {
        let input = chunks(vec![
            &b"event: message\nda"[..],
            &b"ta: {\"a\":1}\r\n\n: comment\n"[..],
            &b"data:[DONE]\n"[..],
        ]);
        let out: Vec<String> = data_payloads(input).map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["{\"a\":1}", "[DONE]"]);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_reads() {
        let text = "data: 카카오\n".as_bytes();
        // split inside the first Hangul syllable
        let (a, b) = text.split_at(7);
        let out: Vec<String> = data_payloads(chunks(vec![a, b])).map(|r| r.unwrap()).collect().await;
        assert_eq!(out, vec!["카카오"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline_is_flushed() {
        let out: Vec<String> = data_payloads(chunks(vec![&b"data: tail"[..]]))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_read_error_terminates_stream() {
        let items: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: one\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: never\n".to_vec()),
        ];
        let out: Vec<Result<String, BackendError>> =
            data_payloads(stream::iter(items)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "one");
        assert!(matches!(&out[1], Err(BackendError::Failed(m)) if m.contains("connection reset")));
    }
}
