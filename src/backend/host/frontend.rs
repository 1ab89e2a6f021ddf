// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Minimal OpenCL C front-end for the host backend.
//!
//! This is not a compiler. It tokenizes the source, checks delimiter balance,
//! checks the statement structure of every function body and extracts
//! `kernel void name(params)` signatures with typed parameters. Each kernel
//! body is also reduced to a normalized token sequence so the driver can
//! compare it with the reference definition of its host implementation.
//!
//! Diagnostics use the familiar `<source>:LINE:COL: error: message` shape so
//! build logs read like a real driver's.

use std::collections::HashSet;

use logos::Logos;

use crate::backend::{AddressSpace, KernelSignature, ParamKind};
use crate::dtype::ScalarType;

const ORIGIN: &str = "<source>";

/// Scalar types OpenCL C forbids in kernel parameter lists.
const FORBIDDEN_PARAM_TYPES: &[&str] = &[
    "bool",
    "half",
    "size_t",
    "ptrdiff_t",
    "intptr_t",
    "uintptr_t",
    "event_t",
];

/// A kernel found in the source, with the position of its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedKernel {
    pub signature: KernelSignature,
    pub line: usize,
    pub col: usize,
    /// Body tokens with parameters renamed to their position (`$0`, `$1`, ..)
    /// and address-space spellings unified.
    pub body: Vec<String>,
}

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"#([^\n\\]|\\[^\n]|\\\n)*")]
enum TokenKind {
    #[token("/*", block_comment)]
    Comment,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9][0-9A-Za-z_.]*", |lex| lex.slice().to_string())]
    #[regex(r"\.[0-9][0-9A-Za-z_.]*", |lex| lex.slice().to_string())]
    Number(String),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| lex.slice().to_string())]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| lex.slice().to_string())]
    Literal(String),

    #[regex(
        r"<<=|>>=|->|\+\+|--|&&|\|\||<<|>>|[-+*/%&|^=!<>]=|[-+*/%&|^!~<>=?:.,;(){}\[\]]",
        |lex| lex.slice().to_string()
    )]
    Punct(String),
}

fn block_comment(lex: &mut logos::Lexer<'_, TokenKind>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: usize,
    col: usize,
}

impl Token {
    fn is_punct(&self, p: &str) -> bool {
        self.punct() == Some(p)
    }

    fn punct(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Punct(p) => Some(p),
            _ => None,
        }
    }

    fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    fn text(&self) -> &str {
        match &self.kind {
            TokenKind::Ident(s)
            | TokenKind::Number(s)
            | TokenKind::Literal(s)
            | TokenKind::Punct(s) => s,
            TokenKind::Comment => "",
        }
    }

    fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Number(s) => format!("number `{s}`"),
            TokenKind::Literal(_) => "literal".to_string(),
            _ => format!("`{}`", self.text()),
        }
    }
}

/// Byte offset to 1-based line and column.
struct LineIndex<'a> {
    source: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&start| start <= offset);
        let start = self.starts[line - 1];
        (line, self.source[start..offset].chars().count() + 1)
    }
}

fn diag(line: usize, col: usize, msg: impl AsRef<str>) -> String {
    format!("{ORIGIN}:{line}:{col}: error: {}", msg.as_ref())
}

fn diag_at(tok: &Token, msg: impl AsRef<str>) -> String {
    diag(tok.line, tok.col, msg)
}

/// Validate build options the way a driver would reject unknown flags.
pub(crate) fn check_options(options: &str) -> Result<(), String> {
    let mut words = options.split_whitespace();
    while let Some(word) = words.next() {
        match word {
            "-w" | "-Werror" => {}
            "-D" | "-I" => {
                if words.next().is_none() {
                    return Err(format!("error: missing argument to `{word}`"));
                }
            }
            w if w.starts_with("-cl-") || w.starts_with("-D") || w.starts_with("-I") => {}
            other => return Err(format!("error: unrecognized build option `{other}`")),
        }
    }
    Ok(())
}

/// Parse `source` and return every kernel it declares.
pub(crate) fn parse_program(source: &str) -> Result<Vec<ParsedKernel>, String> {
    let tokens = tokenize(source)?;
    check_balance(&tokens)?;
    extract_kernels(&tokens)
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let lines = LineIndex::new(source);
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    while let Some(next) = lexer.next() {
        let (line, col) = lines.position(lexer.span().start);
        match next {
            Ok(TokenKind::Comment) => {}
            Ok(kind) => tokens.push(Token { kind, line, col }),
            Err(()) => {
                let slice = lexer.slice();
                let msg = if slice.starts_with("/*") {
                    "unterminated comment".to_string()
                } else if slice.starts_with(['"', '\'']) {
                    "missing terminating quote".to_string()
                } else {
                    format!("stray `{slice}` in program")
                };
                return Err(diag(line, col, msg));
            }
        }
    }
    Ok(tokens)
}

fn closing(open: &str) -> &'static str {
    match open {
        "(" => ")",
        "[" => "]",
        _ => "}",
    }
}

fn check_balance(tokens: &[Token]) -> Result<(), String> {
    let mut stack: Vec<&Token> = Vec::new();
    for tok in tokens {
        match tok.punct() {
            Some("(" | "[" | "{") => stack.push(tok),
            Some(c @ (")" | "]" | "}")) => match stack.pop() {
                None => return Err(diag_at(tok, format!("unexpected `{c}`"))),
                Some(open) => {
                    let open_text = open.text();
                    if closing(open_text) != c {
                        return Err(diag_at(
                            tok,
                            format!(
                                "expected `{}` to match `{open_text}` at {}:{}, found `{c}`",
                                closing(open_text),
                                open.line,
                                open.col
                            ),
                        ));
                    }
                }
            },
            _ => {}
        }
    }
    match stack.pop() {
        Some(open) => Err(diag_at(open, format!("unclosed `{}`", open.text()))),
        None => Ok(()),
    }
}

/// Index just past the delimiter that closes the one at `open`.
fn skip_group(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (offset, tok) in tokens[open..].iter().enumerate() {
        match tok.punct() {
            Some("(" | "[" | "{") => depth += 1,
            Some(")" | "]" | "}") => {
                depth -= 1;
                if depth == 0 {
                    return open + offset + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// What the expression checker accepts next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Want {
    Operand,
    Operator,
    /// After `(words)`: a cast when an operand follows, else a parenthesized name.
    CastOrOperator,
}

fn is_binary(op: &str) -> bool {
    matches!(
        op,
        "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>="
            | "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" | "<<" | ">>"
            | "/" | "%" | "|" | "^" | "?" | ":" | "," | "." | "->"
    )
}

/// `(float)`, `(global uint*)`: a parenthesized type name.
fn is_type_name(tokens: &[Token]) -> bool {
    tokens.first().is_some_and(|t| t.ident().is_some())
        && tokens.iter().all(|t| t.ident().is_some() || t.is_punct("*"))
}

fn expected_expression(before: &Token) -> String {
    diag_at(before, format!("expected expression before {}", before.describe()))
}

fn missing_semicolon(before: &Token) -> String {
    diag_at(before, format!("expected `;` before {}", before.describe()))
}

/// Check one expression or declaration. `end` is the token that follows it.
fn check_expr(tokens: &[Token], end: &Token, allow_empty: bool) -> Result<(), String> {
    if tokens.is_empty() {
        return if allow_empty {
            Ok(())
        } else {
            Err(expected_expression(end))
        };
    }

    let mut want = Want::Operand;
    // Still in a leading run of words such as `unsigned int n` or `float* p`.
    let mut declarator = true;
    let mut prev: Option<&Token> = None;
    let mut i = 0;
    while let Some(tok) = tokens.get(i) {
        match &tok.kind {
            TokenKind::Ident(_) | TokenKind::Number(_) | TokenKind::Literal(_) => {
                let joined = match (&tok.kind, prev.map(|p| &p.kind)) {
                    (TokenKind::Ident(_), Some(TokenKind::Ident(_))) => declarator,
                    (TokenKind::Literal(_), Some(TokenKind::Literal(_))) => true,
                    _ => false,
                };
                if want == Want::Operator && !joined {
                    return Err(missing_semicolon(tok));
                }
                want = Want::Operator;
                i += 1;
            }
            TokenKind::Punct(p) => {
                let p = p.as_str();
                if p != "*" {
                    declarator = false;
                }
                match p {
                    "(" | "[" | "{" => {
                        let close = skip_group(tokens, i);
                        let inner = &tokens[i + 1..close - 1];
                        let closer = &tokens[close - 1];
                        want = match p {
                            "(" if want == Want::Operand && is_type_name(inner) => {
                                Want::CastOrOperator
                            }
                            "(" => {
                                // An empty list is only valid as a call.
                                check_expr(inner, closer, want != Want::Operand)?;
                                Want::Operator
                            }
                            "[" => {
                                if want == Want::Operand {
                                    return Err(expected_expression(tok));
                                }
                                check_expr(inner, closer, true)?;
                                Want::Operator
                            }
                            _ => {
                                let items = match inner.split_last() {
                                    Some((last, rest)) if last.is_punct(",") => rest,
                                    _ => inner,
                                };
                                check_expr(items, closer, true)?;
                                Want::Operator
                            }
                        };
                        i = close;
                        prev = Some(closer);
                        continue;
                    }
                    "++" | "--" => {
                        if want == Want::CastOrOperator {
                            want = Want::Operator;
                        }
                    }
                    "+" | "-" | "*" | "&" => want = Want::Operand,
                    "!" | "~" => {
                        if want == Want::Operator {
                            return Err(missing_semicolon(tok));
                        }
                        want = Want::Operand;
                    }
                    op if is_binary(op) => {
                        if want == Want::Operand {
                            return Err(expected_expression(tok));
                        }
                        want = Want::Operand;
                    }
                    _ => return Err(diag_at(tok, format!("unexpected {}", tok.describe()))),
                }
                i += 1;
            }
            TokenKind::Comment => i += 1,
        }
        prev = Some(tok);
    }

    if want == Want::Operand {
        return Err(expected_expression(end));
    }
    Ok(())
}

fn check_statement(tokens: &[Token], end: &Token) -> Result<(), String> {
    match tokens.split_first() {
        Some((first, rest)) if first.ident() == Some("return") => check_expr(rest, end, true),
        _ => check_expr(tokens, end, true),
    }
}

/// `if (..)`, `while (..)`, `switch (..)` and `for (..;..;..)` headers.
fn check_control(tokens: &[Token], at: usize, keyword: &str) -> Result<usize, String> {
    let open = at + 1;
    match tokens.get(open) {
        Some(t) if t.is_punct("(") => {}
        Some(t) => return Err(diag_at(t, format!("expected `(` after `{keyword}`"))),
        None => return Err(diag_at(&tokens[at], "unexpected end of input")),
    }
    let close = skip_group(tokens, open);
    let inner = &tokens[open + 1..close - 1];
    let closer = &tokens[close - 1];
    if keyword != "for" {
        check_expr(inner, closer, false)?;
        return Ok(close);
    }

    let mut clauses = 0;
    let mut start = 0;
    let mut i = 0;
    while let Some(tok) = inner.get(i) {
        match tok.punct() {
            Some(";") => {
                check_expr(&inner[start..i], tok, true)?;
                clauses += 1;
                i += 1;
                start = i;
            }
            Some("(" | "[" | "{") => i = skip_group(inner, i),
            _ => i += 1,
        }
    }
    if clauses != 2 {
        return Err(diag_at(closer, "expected `;` in `for` statement specifier"));
    }
    check_expr(&inner[start..], closer, true)?;
    Ok(close)
}

/// `case expr:` and `default:`.
fn check_label(tokens: &[Token], at: usize) -> Result<usize, String> {
    let mut i = at + 1;
    while let Some(tok) = tokens.get(i) {
        match tok.punct() {
            Some(":") => {
                if tokens[at].ident() == Some("case") {
                    check_expr(&tokens[at + 1..i], tok, false)?;
                } else if i != at + 1 {
                    return Err(diag_at(&tokens[at + 1], "expected `:` after `default`"));
                }
                return Ok(i + 1);
            }
            Some(";" | "}") => return Err(diag_at(tok, "expected `:` in case label")),
            Some("(" | "[" | "{") => i = skip_group(tokens, i),
            _ => i += 1,
        }
    }
    Err(diag_at(&tokens[at], "unexpected end of input"))
}

/// Check the statements of the block opening at `open`; returns the index
/// just past its closing brace.
fn check_block(tokens: &[Token], open: usize) -> Result<usize, String> {
    let mut i = open + 1;
    let mut start = i;
    while let Some(tok) = tokens.get(i) {
        if i == start {
            if tok.is_punct("{") {
                i = check_block(tokens, i)?;
                start = i;
                continue;
            }
            let next = match tok.ident() {
                Some(kw @ ("if" | "while" | "for" | "switch")) => Some(check_control(tokens, i, kw)?),
                Some("else" | "do") => Some(i + 1),
                Some("case" | "default") => Some(check_label(tokens, i)?),
                _ => None,
            };
            if let Some(next) = next {
                i = next;
                start = i;
                continue;
            }
        }
        match tok.punct() {
            Some(";") => {
                check_statement(&tokens[start..i], tok)?;
                i += 1;
                start = i;
            }
            Some("}") => {
                if start < i {
                    check_statement(&tokens[start..i], tok)?;
                    return Err(missing_semicolon(tok));
                }
                return Ok(i + 1);
            }
            Some("(" | "[" | "{") => i = skip_group(tokens, i),
            _ => i += 1,
        }
    }
    Ok(tokens.len())
}

fn normalize_body(tokens: &[Token], params: &[Option<String>]) -> Vec<String> {
    tokens
        .iter()
        .map(|tok| match tok.ident() {
            Some(word) => {
                if let Some(pos) = params.iter().position(|p| p.as_deref() == Some(word)) {
                    return format!("${pos}");
                }
                match word {
                    "__global" | "__local" | "__constant" | "__private" | "__kernel" => {
                        word.trim_start_matches('_').to_string()
                    }
                    _ => word.to_string(),
                }
            }
            None => tok.text().to_string(),
        })
        .collect()
}

fn extract_kernels(tokens: &[Token]) -> Result<Vec<ParsedKernel>, String> {
    let mut kernels: Vec<ParsedKernel> = Vec::new();
    let mut seen = HashSet::new();
    let mut i = 0;

    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.is_punct("{") {
            // Function bodies get statement checks; initializers do not.
            let is_body = i > 0 && tokens[i - 1].is_punct(")");
            i = if is_body {
                check_block(tokens, i)?
            } else {
                skip_group(tokens, i)
            };
            continue;
        }
        if !matches!(tok.ident(), Some("kernel" | "__kernel")) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while tokens.get(j).and_then(Token::ident) == Some("__attribute__") {
            if !tokens.get(j + 1).is_some_and(|t| t.is_punct("(")) {
                let t = tokens.get(j).unwrap_or(tok);
                return Err(diag_at(t, "expected `(` after `__attribute__`"));
            }
            j = skip_group(tokens, j + 1);
        }

        let ret = expect_token(tokens, j, tok)?;
        if ret.ident() != Some("void") {
            return Err(diag_at(ret, "kernel functions must return void"));
        }
        let name_tok = expect_token(tokens, j + 1, ret)?;
        let Some(name) = name_tok.ident() else {
            return Err(diag_at(
                name_tok,
                format!("expected kernel name, found {}", name_tok.describe()),
            ));
        };
        let open = expect_token(tokens, j + 2, name_tok)?;
        if !open.is_punct("(") {
            return Err(diag_at(
                open,
                format!("expected `(` after kernel name, found {}", open.describe()),
            ));
        }
        let close = skip_group(tokens, j + 2);
        let (params, names): (Vec<ParamKind>, Vec<Option<String>>) =
            parse_params(name, &tokens[j + 3..close - 1], open)?
                .into_iter()
                .unzip();

        let body = expect_token(tokens, close, &tokens[close - 1])?;
        if body.is_punct(";") {
            // Prototype only.
            i = close + 1;
            continue;
        }
        if !body.is_punct("{") {
            return Err(diag_at(
                body,
                format!("expected kernel body, found {}", body.describe()),
            ));
        }

        if !seen.insert(name.to_string()) {
            return Err(diag_at(name_tok, format!("redefinition of kernel `{name}`")));
        }
        let end = check_block(tokens, close)?;
        kernels.push(ParsedKernel {
            signature: KernelSignature {
                name: name.to_string(),
                params,
            },
            line: name_tok.line,
            col: name_tok.col,
            body: normalize_body(&tokens[close + 1..end - 1], &names),
        });
        i = end;
    }

    Ok(kernels)
}

fn expect_token<'a>(tokens: &'a [Token], index: usize, prev: &Token) -> Result<&'a Token, String> {
    tokens
        .get(index)
        .ok_or_else(|| diag_at(prev, "unexpected end of input"))
}

fn parse_params(
    kernel: &str,
    tokens: &[Token],
    open: &Token,
) -> Result<Vec<(ParamKind, Option<String>)>, String> {
    if tokens.is_empty() || (tokens.len() == 1 && tokens[0].ident() == Some("void")) {
        return Ok(Vec::new());
    }

    let mut params = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    for (idx, tok) in tokens.iter().enumerate() {
        match tok.punct() {
            Some("(" | "[") => depth += 1,
            Some(")" | "]") => depth = depth.saturating_sub(1),
            Some(",") if depth == 0 => {
                let anchor = tokens.get(start).unwrap_or(open);
                params.push(parse_param(kernel, &tokens[start..idx], anchor)?);
                start = idx + 1;
            }
            _ => {}
        }
    }
    let anchor = tokens.get(start).or(tokens.last()).unwrap_or(open);
    params.push(parse_param(kernel, &tokens[start..], anchor)?);
    Ok(params)
}

fn parse_param(
    kernel: &str,
    tokens: &[Token],
    anchor: &Token,
) -> Result<(ParamKind, Option<String>), String> {
    if tokens.is_empty() {
        return Err(diag_at(
            anchor,
            format!("expected parameter declaration in kernel `{kernel}`"),
        ));
    }

    let mut space = None;
    let mut pointer = false;
    let mut words = Vec::new();
    for tok in tokens {
        match (&tok.kind, tok.punct()) {
            (TokenKind::Ident(word), _) => match word.as_str() {
                "global" | "__global" => space = Some(AddressSpace::Global),
                "constant" | "__constant" => space = Some(AddressSpace::Constant),
                "local" | "__local" => space = Some(AddressSpace::Local),
                "private" | "__private" | "const" | "restrict" | "__restrict" | "volatile" => {}
                _ => words.push(word.as_str()),
            },
            (_, Some("*")) => pointer = true,
            _ => {
                return Err(diag_at(
                    tok,
                    format!("unexpected {} in parameter list", tok.describe()),
                ));
            }
        }
    }

    // The last word names the parameter; an unnamed parameter is allowed.
    let (type_words, name) = match words.split_last() {
        Some((last, rest)) if !rest.is_empty() => (rest, Some((*last).to_string())),
        _ => (&words[..], None),
    };
    if type_words.is_empty() {
        return Err(diag_at(anchor, "parameter has no type"));
    }
    if let Some(bad) = type_words
        .iter()
        .find(|w| FORBIDDEN_PARAM_TYPES.contains(*w))
    {
        return Err(diag_at(
            anchor,
            format!("parameter of kernel `{kernel}` cannot be declared with type `{bad}`"),
        ));
    }
    let type_name = type_words.join(" ");
    let elem = ScalarType::from_kernel_name(&type_name);

    if pointer {
        let Some(space) = space else {
            return Err(diag_at(
                anchor,
                format!(
                    "pointer parameter of kernel `{kernel}` must be declared global, constant or local"
                ),
            ));
        };
        return Ok((ParamKind::Pointer { space, elem }, name));
    }

    if space.is_some() {
        return Err(diag_at(
            anchor,
            "by-value kernel parameters cannot carry an address space",
        ));
    }
    match elem {
        Some(ty) => Ok((ParamKind::Scalar(ty), name)),
        None => Err(diag_at(
            anchor,
            format!("parameter type `{type_name}` is not supported by the host backend"),
        )),
    }
}
