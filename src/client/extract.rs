//! Incremental extraction of stream nodes from a JSON response body.
//!
//! A downstream response is one JSON document (or several concatenated
//! documents) arriving in arbitrary chunks. [`NodeExtractor`] scans the bytes
//! as they come in and hands out every value picked by its [`NodeSelector`]
//! as soon as that value is syntactically complete, without waiting for the
//! rest of the document. A value is never delivered partially.
//!
//! The scanner only tracks structure (nesting, strings, escapes, literals).
//! Each selected value is decoded with `serde_json`, which also validates it.

use serde_json::Value;
use tracing::trace;

use crate::error::{WipiError, WipiResult};
use crate::types::StreamNode;

/// Which sub-values of a streamed response are delivered as nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeSelector {
    /// Every element of the top-level array.
    ///
    /// A top-level document that is not an array is delivered whole, as a
    /// single node. This also makes newline-delimited objects work.
    #[default]
    Elements,

    /// Every element of the array held by the named field of the top-level
    /// object, e.g. `Field("data")` for `{"data": [..]}`.
    Field(String),

    /// Every complete value at every depth, including scalars and the root,
    /// in completion order (children before their parent).
    ///
    /// Retains the whole document in memory until the root closes.
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug)]
struct Frame {
    container: Container,
    start: usize,
    capture: bool,
    /// Most recent key, for objects.
    key: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Scalar {
    start: usize,
    capture: bool,
}

#[derive(Debug, Clone, Copy)]
enum Lex {
    Value { allow_close: bool },
    Key { allow_close: bool },
    Colon,
    AfterValue,
    Str { key: bool, escape: bool },
    Number,
    Literal { word: &'static [u8], matched: usize },
    Failed,
}

/// Push-based, chunk-boundary-agnostic JSON node extractor.
///
/// ```
/// use wipi_client::client::{NodeExtractor, NodeSelector};
///
/// let mut extractor = NodeExtractor::new(NodeSelector::Elements);
/// let mut nodes = Vec::new();
/// extractor.feed(br#"[{"t": 1}, {"t""#, &mut nodes).unwrap();
/// assert_eq!(nodes.len(), 1);
/// extractor.feed(br#": 2}]"#, &mut nodes).unwrap();
/// extractor.finish(&mut nodes).unwrap();
/// assert_eq!(nodes.len(), 2);
/// ```
#[derive(Debug)]
pub struct NodeExtractor {
    selector: NodeSelector,
    stack: Vec<Frame>,
    lex: Lex,
    scalar: Option<Scalar>,
    key_buf: Vec<u8>,
    /// Unconsumed bytes and bytes of values still being captured.
    buf: Vec<u8>,
    /// Absolute offset of `buf[0]`.
    base: usize,
    /// Absolute offset of the next byte to scan.
    cursor: usize,
    emitted: usize,
}

impl NodeExtractor {
    /// Create an extractor using `selector`.
    pub fn new(selector: NodeSelector) -> Self {
        Self {
            selector,
            stack: Vec::new(),
            lex: Lex::Value { allow_close: false },
            scalar: None,
            key_buf: Vec::new(),
            buf: Vec::new(),
            base: 0,
            cursor: 0,
            emitted: 0,
        }
    }

    /// Number of nodes emitted so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Number of bytes currently held back (partial values).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Scan the next chunk, pushing every completed node onto `out`.
    ///
    /// On malformed input, nodes completed before the offending byte are
    /// still pushed, then the error is returned and the extractor refuses
    /// further input.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<StreamNode>) -> WipiResult<()> {
        if matches!(self.lex, Lex::Failed) {
            return Err(WipiError::InvalidJson(
                "stream extractor already failed".to_string(),
            ));
        }

        self.buf.extend_from_slice(chunk);
        let end = self.base + self.buf.len();

        while self.cursor < end {
            let byte = self.buf[self.cursor - self.base];
            match self.step(byte, self.cursor, out) {
                Ok(true) => self.cursor += 1,
                Ok(false) => {}
                Err(e) => {
                    self.lex = Lex::Failed;
                    return Err(e);
                }
            }
        }

        self.compact();
        Ok(())
    }

    /// Signal end of input.
    ///
    /// Flushes a top-level number (which has no terminator of its own) and
    /// fails if the input stopped inside a value.
    pub fn finish(&mut self, out: &mut Vec<StreamNode>) -> WipiResult<()> {
        if matches!(self.lex, Lex::Number) && self.stack.is_empty() {
            let end = self.cursor;
            if let Err(e) = self.end_scalar(end, out) {
                self.lex = Lex::Failed;
                return Err(e);
            }
        }

        match self.lex {
            Lex::Value { .. } if self.stack.is_empty() => Ok(()),
            Lex::Failed => Err(WipiError::InvalidJson(
                "stream extractor already failed".to_string(),
            )),
            _ => {
                self.lex = Lex::Failed;
                Err(WipiError::InvalidJson(format!(
                    "stream ended inside an incomplete JSON value (depth {}, offset {})",
                    self.stack.len(),
                    self.cursor
                )))
            }
        }
    }

    /// Scan one byte at absolute offset `pos`. Returns `false` if the byte
    /// must be scanned again in the new lexer state.
    fn step(&mut self, byte: u8, pos: usize, out: &mut Vec<StreamNode>) -> WipiResult<bool> {
        match self.lex {
            Lex::Value { allow_close } => {
                if byte.is_ascii_whitespace() {
                    return Ok(true);
                }
                match byte {
                    b']' if allow_close => self.close(Container::Array, pos, out)?,
                    b'{' => {
                        self.open(Container::Object, pos);
                        self.lex = Lex::Key { allow_close: true };
                    }
                    b'[' => {
                        self.open(Container::Array, pos);
                        self.lex = Lex::Value { allow_close: true };
                    }
                    b'"' => {
                        self.begin_scalar(pos);
                        self.lex = Lex::Str {
                            key: false,
                            escape: false,
                        };
                    }
                    b'-' | b'0'..=b'9' => {
                        self.begin_scalar(pos);
                        self.lex = Lex::Number;
                    }
                    b't' => self.begin_literal(pos, b"true"),
                    b'f' => self.begin_literal(pos, b"false"),
                    b'n' => self.begin_literal(pos, b"null"),
                    _ => return Err(unexpected(byte, pos, "a value")),
                }
                Ok(true)
            }
            Lex::Key { allow_close } => {
                if byte.is_ascii_whitespace() {
                    return Ok(true);
                }
                match byte {
                    b'}' if allow_close => self.close(Container::Object, pos, out)?,
                    b'"' => {
                        self.key_buf.clear();
                        self.key_buf.push(byte);
                        self.lex = Lex::Str {
                            key: true,
                            escape: false,
                        };
                    }
                    _ => return Err(unexpected(byte, pos, "an object key")),
                }
                Ok(true)
            }
            Lex::Colon => {
                if byte.is_ascii_whitespace() {
                    return Ok(true);
                }
                if byte != b':' {
                    return Err(unexpected(byte, pos, "':'"));
                }
                self.lex = Lex::Value { allow_close: false };
                Ok(true)
            }
            Lex::AfterValue => {
                if byte.is_ascii_whitespace() {
                    return Ok(true);
                }
                match (byte, self.top()) {
                    (b',', Some(Container::Array)) => {
                        self.lex = Lex::Value { allow_close: false }
                    }
                    (b',', Some(Container::Object)) => self.lex = Lex::Key { allow_close: false },
                    (b']', Some(Container::Array)) => self.close(Container::Array, pos, out)?,
                    (b'}', Some(Container::Object)) => self.close(Container::Object, pos, out)?,
                    _ => return Err(unexpected(byte, pos, "',' or a closing bracket")),
                }
                Ok(true)
            }
            Lex::Str { key, escape } => {
                if key {
                    self.key_buf.push(byte);
                }
                if escape {
                    self.lex = Lex::Str { key, escape: false };
                } else if byte == b'\\' {
                    self.lex = Lex::Str { key, escape: true };
                } else if byte == b'"' {
                    if key {
                        let name: String = serde_json::from_slice(&self.key_buf).map_err(|e| {
                            WipiError::InvalidJson(format!("malformed object key at offset {pos}: {e}"))
                        })?;
                        if let Some(frame) = self.stack.last_mut() {
                            frame.key = Some(name);
                        }
                        self.lex = Lex::Colon;
                    } else {
                        self.end_scalar(pos + 1, out)?;
                    }
                }
                Ok(true)
            }
            Lex::Number => {
                if matches!(byte, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') {
                    return Ok(true);
                }
                self.end_scalar(pos, out)?;
                Ok(false)
            }
            Lex::Literal { word, matched } => {
                if byte != word[matched] {
                    return Err(unexpected(byte, pos, "a literal"));
                }
                if matched + 1 == word.len() {
                    self.end_scalar(pos + 1, out)?;
                } else {
                    self.lex = Lex::Literal {
                        word,
                        matched: matched + 1,
                    };
                }
                Ok(true)
            }
            Lex::Failed => Err(WipiError::InvalidJson(
                "stream extractor already failed".to_string(),
            )),
        }
    }

    fn top(&self) -> Option<Container> {
        self.stack.last().map(|frame| frame.container)
    }

    /// Whether a value starting now (of the given container kind, or a
    /// scalar for `None`) is a node.
    fn selects(&self, container: Option<Container>) -> bool {
        match &self.selector {
            NodeSelector::Any => true,
            NodeSelector::Elements => match self.stack.as_slice() {
                [] => container != Some(Container::Array),
                [root] => root.container == Container::Array,
                _ => false,
            },
            NodeSelector::Field(name) => match self.stack.as_slice() {
                [root, list] => {
                    root.container == Container::Object
                        && list.container == Container::Array
                        && root.key.as_deref() == Some(name.as_str())
                }
                _ => false,
            },
        }
    }

    fn open(&mut self, container: Container, pos: usize) {
        let capture = self.selects(Some(container));
        self.stack.push(Frame {
            container,
            start: pos,
            capture,
            key: None,
        });
    }

    fn close(
        &mut self,
        container: Container,
        pos: usize,
        out: &mut Vec<StreamNode>,
    ) -> WipiResult<()> {
        match self.stack.pop() {
            Some(frame) if frame.container == container => {
                self.end_value(frame.start, pos + 1, frame.capture, out)
            }
            _ => Err(WipiError::InvalidJson(format!(
                "mismatched closing bracket at offset {pos}"
            ))),
        }
    }

    fn begin_scalar(&mut self, pos: usize) {
        let capture = self.selects(None);
        self.scalar = Some(Scalar {
            start: pos,
            capture,
        });
    }

    fn begin_literal(&mut self, pos: usize, word: &'static [u8]) {
        self.begin_scalar(pos);
        self.lex = Lex::Literal { word, matched: 1 };
    }

    fn end_scalar(&mut self, end: usize, out: &mut Vec<StreamNode>) -> WipiResult<()> {
        match self.scalar.take() {
            Some(scalar) => self.end_value(scalar.start, end, scalar.capture, out),
            None => Err(WipiError::InvalidJson(format!(
                "scalar ended at offset {end} without a start"
            ))),
        }
    }

    fn end_value(
        &mut self,
        start: usize,
        end: usize,
        capture: bool,
        out: &mut Vec<StreamNode>,
    ) -> WipiResult<()> {
        if capture {
            let bytes = &self.buf[start - self.base..end - self.base];
            let value: Value = serde_json::from_slice(bytes).map_err(|e| {
                WipiError::InvalidJson(format!("malformed stream node at offset {start}: {e}"))
            })?;
            trace!(offset = start, len = end - start, "extracted stream node");
            out.push(StreamNode::new(value));
            self.emitted += 1;
        }

        self.lex = if self.stack.is_empty() {
            Lex::Value { allow_close: false }
        } else {
            Lex::AfterValue
        };
        Ok(())
    }

    /// Drop bytes no open capture needs any more.
    fn compact(&mut self) {
        let keep_from = self
            .stack
            .iter()
            .filter(|frame| frame.capture)
            .map(|frame| frame.start)
            .chain(self.scalar.iter().filter(|s| s.capture).map(|s| s.start))
            .min()
            .unwrap_or(self.cursor);

        if keep_from > self.base {
            self.buf.drain(..keep_from - self.base);
            self.base = keep_from;
        }
    }
}

fn unexpected(byte: u8, pos: usize, expected: &str) -> WipiError {
    WipiError::InvalidJson(format!(
        "unexpected {:?} at offset {pos}, expected {expected}",
        byte as char
    ))
}
