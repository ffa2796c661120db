//! Byte-level JSON recognizer driven by a compiled [`Grammar`].
//!
//! The recognizer keeps a set of parser stacks (cursors). Unions fork a
//! cursor per alternative; a byte that no cursor can take leaves the set
//! untouched and is reported as rejected. The bottom frame of every stack
//! is [`Frame::End`], which only admits trailing whitespace.

use super::schema::{Grammar, Node, NodeId, ANY_ARRAY, ANY_OBJECT, ANY_STRING};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Backslash,
    Hex(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumState {
    Minus,
    Zero,
    Int,
    Dot,
    Frac,
    Exp,
    ExpSign,
    ExpInt,
}

impl NumState {
    const fn accepting(self) -> bool {
        matches!(self, Self::Zero | Self::Int | Self::Frac | Self::ExpInt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    Open,
    AfterComma,
    AfterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjState {
    Open,
    AfterKey,
    AfterValue,
    AfterComma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    End,
    Value(NodeId),
    Keyword {
        word: &'static [u8],
        pos: usize,
    },
    Literal {
        node: NodeId,
        pos: usize,
    },
    Str {
        node: NodeId,
        len: usize,
        esc: Escape,
    },
    Num {
        state: NumState,
        integer: bool,
    },
    Array {
        node: NodeId,
        count: usize,
        state: ListState,
    },
    Object {
        node: NodeId,
        seen: u64,
        state: ObjState,
        pending: NodeId,
    },
    Key {
        buf: Vec<u8>,
        esc: Escape,
    },
}

type Stack = Vec<Frame>;

const fn is_ws(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

const fn is_escape(byte: u8) -> bool {
    matches!(byte, b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' | b'u')
}

fn push_unique(out: &mut Vec<Stack>, stack: Stack) {
    if !out.contains(&stack) {
        out.push(stack);
    }
}

fn required_mask(count: usize) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

/// Nondeterministic recognizer state
#[derive(Debug, Clone)]
pub(crate) struct Recognizer {
    grammar: Arc<Grammar>,
    cursors: Vec<Stack>,
}

impl Recognizer {
    pub(crate) fn new(grammar: Arc<Grammar>) -> Self {
        let root = grammar.root();
        Self {
            grammar,
            cursors: vec![vec![Frame::End, Frame::Value(root)]],
        }
    }

    /// Cursors reached after `bytes`, or `None` if the input dies
    pub(crate) fn successors(&self, bytes: &[u8]) -> Option<Cursors> {
        advance_all(&self.grammar, &self.cursors, bytes).map(Cursors)
    }

    /// Whether `rest` could be consumed starting from precomputed cursors
    pub(crate) fn accepts_from(&self, cursors: &Cursors, rest: &[u8]) -> bool {
        advance_all(&self.grammar, &cursors.0, rest).is_some()
    }

    /// Consume `bytes` as a unit; on rejection the state is unchanged
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> bool {
        match self.successors(bytes) {
            Some(next) => {
                self.cursors = next.0;
                true
            }
            None => false,
        }
    }

    /// Whether the input so far is a complete instance
    pub(crate) fn is_accepting(&self) -> bool {
        self.cursors.iter().any(|stack| at_end(stack))
    }
}

/// Opaque set of parser stacks
#[derive(Debug, Clone)]
pub(crate) struct Cursors(Vec<Stack>);

fn advance_all(grammar: &Grammar, cursors: &[Stack], bytes: &[u8]) -> Option<Vec<Stack>> {
    let mut current = cursors.to_vec();
    for &byte in bytes {
        let mut next = Vec::with_capacity(current.len());
        for stack in current {
            advance(grammar, stack, byte, &mut next);
        }
        if next.is_empty() {
            return None;
        }
        current = next;
    }
    Some(current)
}

fn at_end(stack: &[Frame]) -> bool {
    match stack.last() {
        Some(Frame::End) => true,
        Some(Frame::Num { state, .. }) if state.accepting() => {
            let mut rest = stack[..stack.len() - 1].to_vec();
            finish(&mut rest) && matches!(rest.last(), Some(Frame::End))
        }
        _ => false,
    }
}

/// Tell the parent frame a child value completed. Returns false if the
/// parent cannot take another value.
fn finish(stack: &mut Stack) -> bool {
    match stack.last_mut() {
        Some(Frame::Array { count, state, .. }) => {
            *count += 1;
            *state = ListState::AfterValue;
            true
        }
        Some(Frame::Object { state, .. }) => {
            *state = ObjState::AfterValue;
            true
        }
        Some(Frame::End) => true,
        _ => false,
    }
}

fn complete(grammar: &Grammar, mut stack: Stack, out: &mut Vec<Stack>) {
    if !finish(&mut stack) {
        return;
    }
    if let Some(Frame::Array { node, count, .. }) = stack.last() {
        if let Node::Array {
            max_items: Some(max),
            ..
        } = grammar.node(*node)
        {
            if count > max {
                return;
            }
        }
    }
    push_unique(out, stack);
}

fn advance(grammar: &Grammar, mut stack: Stack, byte: u8, out: &mut Vec<Stack>) {
    let Some(top) = stack.last_mut() else {
        return;
    };
    match top {
        Frame::End => {
            if is_ws(byte) {
                push_unique(out, stack);
            }
        }
        Frame::Value(node) => {
            if is_ws(byte) {
                push_unique(out, stack);
                return;
            }
            let node = *node;
            stack.pop();
            start_value(grammar, stack, node, byte, out);
        }
        Frame::Keyword { word, pos } => {
            if word.get(*pos) != Some(&byte) {
                return;
            }
            *pos += 1;
            if *pos == word.len() {
                stack.pop();
                complete(grammar, stack, out);
            } else {
                push_unique(out, stack);
            }
        }
        Frame::Literal { node, pos } => {
            let Node::Literal(bytes) = grammar.node(*node) else {
                return;
            };
            if bytes.get(*pos) != Some(&byte) {
                return;
            }
            *pos += 1;
            if *pos == bytes.len() {
                stack.pop();
                complete(grammar, stack, out);
            } else {
                push_unique(out, stack);
            }
        }
        Frame::Str { node, len, esc } => {
            let (min_len, max_len) = match grammar.node(*node) {
                Node::String { min_len, max_len } => (*min_len, *max_len),
                _ => (0, None),
            };
            match *esc {
                Escape::None => match byte {
                    b'"' => {
                        if *len >= min_len {
                            stack.pop();
                            complete(grammar, stack, out);
                        }
                        return;
                    }
                    b'\\' => *esc = Escape::Backslash,
                    0..=0x1f => return,
                    // continuation bytes do not start a code point
                    _ if byte & 0xC0 == 0x80 => {}
                    _ => *len += 1,
                },
                Escape::Backslash => {
                    if !is_escape(byte) {
                        return;
                    }
                    *len += 1;
                    *esc = if byte == b'u' { Escape::Hex(0) } else { Escape::None };
                }
                Escape::Hex(n) => {
                    if !byte.is_ascii_hexdigit() {
                        return;
                    }
                    *esc = if n == 3 { Escape::None } else { Escape::Hex(n + 1) };
                }
            }
            if max_len.is_some_and(|max| *len > max) {
                return;
            }
            push_unique(out, stack);
        }
        Frame::Num { state, integer } => {
            let next = match (*state, byte) {
                (NumState::Minus, b'0') => Some(NumState::Zero),
                (NumState::Minus | NumState::Int, b'1'..=b'9') | (NumState::Int, b'0') => {
                    Some(NumState::Int)
                }
                (NumState::Zero | NumState::Int, b'.') => Some(NumState::Dot),
                (NumState::Dot | NumState::Frac, b'0') => Some(NumState::Frac),
                (NumState::Dot | NumState::Frac, b'1'..=b'9') if !*integer => Some(NumState::Frac),
                (NumState::Zero | NumState::Int | NumState::Frac, b'e' | b'E') if !*integer => {
                    Some(NumState::Exp)
                }
                (NumState::Exp, b'+' | b'-') => Some(NumState::ExpSign),
                (NumState::Exp | NumState::ExpSign | NumState::ExpInt, b'0'..=b'9') => {
                    Some(NumState::ExpInt)
                }
                _ => None,
            };
            match next {
                Some(next) => {
                    *state = next;
                    push_unique(out, stack);
                }
                None => {
                    // the byte ends the number and belongs to the parent
                    if !state.accepting() {
                        return;
                    }
                    stack.pop();
                    let mut parents = Vec::new();
                    complete(grammar, stack, &mut parents);
                    for parent in parents {
                        advance(grammar, parent, byte, out);
                    }
                }
            }
        }
        Frame::Array { node, count, state } => {
            let Node::Array {
                items,
                min_items,
                max_items,
            } = grammar.node(*node).clone()
            else {
                return;
            };
            if is_ws(byte) {
                push_unique(out, stack);
                return;
            }
            match (*state, byte) {
                (ListState::Open | ListState::AfterValue, b']') => {
                    if *count >= min_items {
                        stack.pop();
                        complete(grammar, stack, out);
                    }
                }
                (ListState::AfterValue, b',') => {
                    if max_items.map_or(true, |max| *count < max) {
                        *state = ListState::AfterComma;
                        push_unique(out, stack);
                    }
                }
                (ListState::Open | ListState::AfterComma, _) => {
                    if max_items.map_or(true, |max| *count < max) {
                        start_value(grammar, stack, items, byte, out);
                    }
                }
                _ => {}
            }
        }
        Frame::Object {
            node,
            seen,
            state,
            pending,
        } => {
            if is_ws(byte) {
                push_unique(out, stack);
                return;
            }
            let required = match grammar.node(*node) {
                Node::Object { required, .. } => required.len(),
                _ => 0,
            };
            match (*state, byte) {
                (ObjState::Open | ObjState::AfterComma, b'"') => {
                    stack.push(Frame::Key {
                        buf: Vec::new(),
                        esc: Escape::None,
                    });
                    push_unique(out, stack);
                }
                (ObjState::Open | ObjState::AfterValue, b'}') => {
                    if *seen & required_mask(required) == required_mask(required) {
                        stack.pop();
                        complete(grammar, stack, out);
                    }
                }
                (ObjState::AfterKey, b':') => {
                    let value = *pending;
                    *state = ObjState::AfterValue;
                    stack.push(Frame::Value(value));
                    push_unique(out, stack);
                }
                (ObjState::AfterValue, b',') => {
                    *state = ObjState::AfterComma;
                    push_unique(out, stack);
                }
                _ => {}
            }
        }
        Frame::Key { buf, esc } => {
            match *esc {
                Escape::None => match byte {
                    b'"' => {
                        let key = std::mem::take(buf);
                        stack.pop();
                        close_key(grammar, stack, &key, out);
                        return;
                    }
                    b'\\' => *esc = Escape::Backslash,
                    0..=0x1f => return,
                    _ => {}
                },
                Escape::Backslash => {
                    if !is_escape(byte) {
                        return;
                    }
                    *esc = if byte == b'u' { Escape::Hex(0) } else { Escape::None };
                }
                Escape::Hex(n) => {
                    if !byte.is_ascii_hexdigit() {
                        return;
                    }
                    *esc = if n == 3 { Escape::None } else { Escape::Hex(n + 1) };
                }
            }
            buf.push(byte);
            let prefix = buf.clone();
            if key_prefix_viable(grammar, &stack, &prefix) {
                push_unique(out, stack);
            }
        }
    }
}

fn object_parent(stack: &[Frame]) -> Option<NodeId> {
    stack.iter().rev().find_map(|frame| match frame {
        Frame::Object { node, .. } => Some(*node),
        _ => None,
    })
}

fn key_prefix_viable(grammar: &Grammar, stack: &[Frame], prefix: &[u8]) -> bool {
    let Some(node) = object_parent(stack) else {
        return false;
    };
    match grammar.node(node) {
        Node::Object {
            properties,
            additional,
            ..
        } if *additional == super::schema::NEVER => {
            properties.iter().any(|(name, _)| name.starts_with(prefix))
        }
        _ => true,
    }
}

fn close_key(grammar: &Grammar, mut stack: Stack, key: &[u8], out: &mut Vec<Stack>) {
    let Some(Frame::Object {
        node,
        seen,
        state,
        pending,
    }) = stack.last_mut()
    else {
        return;
    };
    let Node::Object {
        properties,
        required,
        additional,
    } = grammar.node(*node)
    else {
        return;
    };
    let value = properties
        .iter()
        .find(|(name, _)| name == key)
        .map_or(*additional, |(_, id)| *id);
    if value == super::schema::NEVER {
        return;
    }
    if let Some(bit) = required.iter().position(|name| name == key) {
        *seen |= 1u64 << bit;
    }
    *pending = value;
    *state = ObjState::AfterKey;
    push_unique(out, stack);
}

fn start_value(grammar: &Grammar, mut stack: Stack, node: NodeId, byte: u8, out: &mut Vec<Stack>) {
    match grammar.node(node) {
        Node::Never => {}
        Node::Union(alts) => {
            for &alt in alts {
                start_value(grammar, stack.clone(), alt, byte, out);
            }
        }
        Node::Any => match byte {
            b'{' => start_value(grammar, stack, ANY_OBJECT, byte, out),
            b'[' => start_value(grammar, stack, ANY_ARRAY, byte, out),
            b'"' => start_value(grammar, stack, ANY_STRING, byte, out),
            b't' | b'f' | b'n' => start_keyword(stack, byte, out),
            b'-' | b'0'..=b'9' => start_number(stack, byte, false, out),
            _ => {}
        },
        Node::Null => {
            if byte == b'n' {
                start_keyword(stack, byte, out);
            }
        }
        Node::Boolean => {
            if byte == b't' || byte == b'f' {
                start_keyword(stack, byte, out);
            }
        }
        Node::Integer => start_number(stack, byte, true, out),
        Node::Number => start_number(stack, byte, false, out),
        Node::String { .. } => {
            if byte == b'"' {
                stack.push(Frame::Str {
                    node,
                    len: 0,
                    esc: Escape::None,
                });
                push_unique(out, stack);
            }
        }
        Node::Literal(bytes) => {
            if bytes.first() != Some(&byte) {
                return;
            }
            if bytes.len() == 1 {
                complete(grammar, stack, out);
            } else {
                stack.push(Frame::Literal { node, pos: 1 });
                push_unique(out, stack);
            }
        }
        Node::Array { .. } => {
            if byte == b'[' {
                stack.push(Frame::Array {
                    node,
                    count: 0,
                    state: ListState::Open,
                });
                push_unique(out, stack);
            }
        }
        Node::Object { .. } => {
            if byte == b'{' {
                stack.push(Frame::Object {
                    node,
                    seen: 0,
                    state: ObjState::Open,
                    pending: super::schema::NEVER,
                });
                push_unique(out, stack);
            }
        }
    }
}

fn start_keyword(mut stack: Stack, byte: u8, out: &mut Vec<Stack>) {
    let word: &'static [u8] = match byte {
        b't' => b"true",
        b'f' => b"false",
        b'n' => b"null",
        _ => return,
    };
    stack.push(Frame::Keyword { word, pos: 1 });
    push_unique(out, stack);
}

fn start_number(mut stack: Stack, byte: u8, integer: bool, out: &mut Vec<Stack>) {
    let state = match byte {
        b'-' => NumState::Minus,
        b'0' => NumState::Zero,
        b'1'..=b'9' => NumState::Int,
        _ => return,
    };
    stack.push(Frame::Num { state, integer });
    push_unique(out, stack);
}
