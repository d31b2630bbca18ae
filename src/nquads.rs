// Line-based N-Triples / N-Quads, the syntaxes registered by default.
use std::io::{self, BufRead, Write};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use url::Url;

use crate::rdf::{ParseError, RdfParser, RdfWriter, StatementSink};
use crate::store::{GraphName, Quad, Term, Triple};

lazy_static! {
    static ref TERM: Regex = Regex::new(
        r#"^[ \t]*(?:<(?P<iri>[^<>"{}|^`\\\x00-\x20]*)>|_:(?P<bnode>[A-Za-z0-9_][A-Za-z0-9_\-]*)|"(?P<lex>(?:[^"\\\r\n]|\\.)*)"(?:@(?P<lang>[A-Za-z]+(?:-[A-Za-z0-9]+)*)|\^\^<(?P<dt>[^<>"{}|^`\\\x00-\x20]*)>)?)"#
    )
    .unwrap();
    static ref END: Regex = Regex::new(r"^[ \t]*\.[ \t]*(?:#.*)?$").unwrap();
}

pub struct LineParser {
    quads: bool,
}

impl LineParser {
    pub fn triples() -> Self {
        Self { quads: false }
    }
    pub fn quads() -> Self {
        Self { quads: true }
    }

    fn statement(
        &self,
        line: &str,
        line_no: u64,
        base: Option<&Url>,
        sink: &mut dyn StatementSink,
    ) -> Result<(), ParseError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut terms: Vec<(Term, u64)> = Vec::with_capacity(4);
        let mut col = 1u64;
        while terms.len() < 4 && !END.is_match(rest) {
            let caps = TERM
                .captures(rest)
                .ok_or_else(|| syntax("Expected an RDF term", line_no, col))?;
            let consumed = caps.get(0).map(|m| m.end()).unwrap_or(0);
            terms.push((term(&caps, base, line_no, col)?, col));
            col += consumed as u64;
            rest = &rest[consumed..];
        }
        if !END.is_match(rest) {
            return Err(syntax("Expected '.' to end the statement", line_no, col));
        }
        let mut terms = terms.into_iter();
        let (subject, s_col) = terms
            .next()
            .ok_or_else(|| syntax("Missing subject", line_no, col))?;
        let (predicate, p_col) = terms
            .next()
            .ok_or_else(|| syntax("Missing predicate", line_no, col))?;
        let (object, _) = terms
            .next()
            .ok_or_else(|| syntax("Missing object", line_no, col))?;
        if matches!(subject, Term::Literal { .. }) {
            return Err(syntax("Literal in subject position", line_no, s_col));
        }
        if !matches!(predicate, Term::Iri(_)) {
            return Err(syntax("Predicate must be an IRI", line_no, p_col));
        }
        let triple = Triple::new(subject, predicate, object);
        match terms.next() {
            None => sink.triple(triple)?,
            Some((_, g_col)) if !self.quads => {
                return Err(syntax("N-Triples does not allow a graph term", line_no, g_col));
            }
            Some((Term::Iri(graph), _)) => sink.quad(Quad::new(GraphName::Named(graph), triple))?,
            Some((_, g_col)) => return Err(syntax("Graph name must be an IRI", line_no, g_col)),
        }
        Ok(())
    }
}

fn syntax(message: &str, line: u64, col: u64) -> ParseError {
    ParseError::Syntax { message: message.to_string(), line, col }
}

fn term(caps: &Captures<'_>, base: Option<&Url>, line: u64, col: u64) -> Result<Term, ParseError> {
    if let Some(iri) = caps.name("iri") {
        return resolve(iri.as_str(), base, line, col).map(Term::Iri);
    }
    if let Some(label) = caps.name("bnode") {
        return Ok(Term::BlankNode(label.as_str().to_string()));
    }
    let lex = caps.name("lex").map(|m| m.as_str()).unwrap_or_default();
    let datatype = match caps.name("dt") {
        Some(dt) => Some(resolve(dt.as_str(), base, line, col)?),
        None => None,
    };
    Ok(Term::Literal {
        value: unescape(lex).ok_or_else(|| syntax("Bad escape sequence", line, col))?,
        datatype,
        language: caps.name("lang").map(|m| m.as_str().to_ascii_lowercase()),
    })
}

fn resolve(iri: &str, base: Option<&Url>, line: u64, col: u64) -> Result<String, ParseError> {
    if Url::parse(iri).is_ok() {
        return Ok(iri.to_string());
    }
    base.and_then(|b| b.join(iri).ok())
        .map(String::from)
        .ok_or_else(|| syntax(&format!("Relative IRI <{iri}> with no usable base"), line, col))
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            'f' => out.push('\u{c}'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            '\\' => out.push('\\'),
            'u' => out.push(hex_char(&mut chars, 4)?),
            'U' => out.push(hex_char(&mut chars, 8)?),
            _ => return None,
        }
    }
    Some(out)
}

fn hex_char(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<char> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits {
        return None;
    }
    u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
}

impl RdfParser for LineParser {
    fn parse(
        &self,
        input: &mut dyn BufRead,
        base: &str,
        sink: &mut dyn StatementSink,
    ) -> Result<(), ParseError> {
        let base = Url::parse(base).ok();
        let mut line = String::new();
        let mut line_no = 0u64;
        loop {
            line.clear();
            let read = input.read_line(&mut line).map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => syntax("Bad UTF-8 encoding", line_no + 1, 1),
                _ => ParseError::Io(e),
            })?;
            if read == 0 {
                return Ok(());
            }
            line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.statement(&line, line_no, base.as_ref(), sink)?;
        }
    }
}

pub struct LineWriter;

impl RdfWriter for LineWriter {
    fn write_triples(&self, out: &mut dyn Write, triples: &[Triple]) -> io::Result<()> {
        for t in triples {
            writeln!(out, "{} {} {} .", t.subject, t.predicate, t.object)?;
        }
        Ok(())
    }
    fn write_quads(&self, out: &mut dyn Write, quads: &[Quad]) -> io::Result<()> {
        for q in quads {
            let t = &q.triple;
            match &q.graph {
                GraphName::Default => writeln!(out, "{} {} {} .", t.subject, t.predicate, t.object)?,
                GraphName::Named(g) => {
                    writeln!(out, "{} {} {} <{g}> .", t.subject, t.predicate, t.object)?
                }
            }
        }
        Ok(())
    }
}
