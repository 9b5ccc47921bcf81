//! Read-only gate for caller-supplied Cypher.
//!
//! A query is tokenized, classified against the configured bounds, and either accepted as a
//! [`ValidatedQuery`] or rejected with a [`Rejection`]. Nothing here talks to the graph store.

use std::sync::LazyLock;

use regex::RegexSet;
use serde_json::{Map, Value};

const WRITE_KEYWORDS: [&str; 14] = [
	"CREATE", "DELETE", "DETACH", "SET", "MERGE", "DROP", "REMOVE", "FOREACH", "INSERT", "ALTER",
	"RENAME", "GRANT", "DENY", "REVOKE",
];
const DISALLOWED_CLAUSES: [&str; 13] = [
	"UNWIND",
	"UNION",
	"LOAD",
	"SHOW",
	"USE",
	"START",
	"STOP",
	"TERMINATE",
	"ENABLE",
	"USING",
	"FINISH",
	"PROFILE",
	"EXPLAIN",
];
const LEADING_CLAUSES: [&str; 4] = ["MATCH", "OPTIONAL", "CALL", "WITH"];
/// Words allowed right after a complete operand: read clauses and infix or trailing operators.
const CLAUSE_POSITION_KEYWORDS: [&str; 27] = [
	"MATCH", "OPTIONAL", "WHERE", "RETURN", "WITH", "ORDER", "SKIP", "LIMIT", "CALL", "YIELD", "AND",
	"OR", "XOR", "IN", "IS", "AS", "STARTS", "ENDS", "CONTAINS", "ASC", "ASCENDING", "DESC",
	"DESCENDING", "WHEN", "THEN", "ELSE", "END",
];
/// Words after which an operand starts.
const OPERAND_KEYWORDS: [&str; 26] = [
	"MATCH", "OPTIONAL", "WHERE", "RETURN", "WITH", "ORDER", "BY", "SKIP", "LIMIT", "CALL", "YIELD",
	"AND", "OR", "XOR", "NOT", "IN", "IS", "AS", "STARTS", "ENDS", "CONTAINS", "DISTINCT", "CASE",
	"WHEN", "THEN", "ELSE",
];

static INTERPOLATION: LazyLock<RegexSet> = LazyLock::new(|| {
	RegexSet::new([r"\$\{", r"\{\{", r"%s", r"%\(", r"#\{"])
		.expect("Interpolation patterns must compile.")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
	RejectEmpty,
	RejectTooLong,
	RejectWriteKeyword,
	RejectDisallowedClause,
	RejectDisallowedProcedure,
	RejectTooComplex,
	RejectTooDeep,
	RejectUnboundedTraversal,
	RejectInjection,
	RejectMultipleStatements,
	RejectComment,
	RejectStringLiteral,
	RejectMissingParam,
	RejectSyntax,
}
impl RejectCode {
	pub fn as_str(self) -> &'static str {
		match self {
			RejectCode::RejectEmpty => "REJECT_EMPTY",
			RejectCode::RejectTooLong => "REJECT_TOO_LONG",
			RejectCode::RejectWriteKeyword => "REJECT_WRITE_KEYWORD",
			RejectCode::RejectDisallowedClause => "REJECT_DISALLOWED_CLAUSE",
			RejectCode::RejectDisallowedProcedure => "REJECT_DISALLOWED_PROCEDURE",
			RejectCode::RejectTooComplex => "REJECT_TOO_COMPLEX",
			RejectCode::RejectTooDeep => "REJECT_TOO_DEEP",
			RejectCode::RejectUnboundedTraversal => "REJECT_UNBOUNDED_TRAVERSAL",
			RejectCode::RejectInjection => "REJECT_INJECTION",
			RejectCode::RejectMultipleStatements => "REJECT_MULTIPLE_STATEMENTS",
			RejectCode::RejectComment => "REJECT_COMMENT",
			RejectCode::RejectStringLiteral => "REJECT_STRING_LITERAL",
			RejectCode::RejectMissingParam => "REJECT_MISSING_PARAM",
			RejectCode::RejectSyntax => "REJECT_SYNTAX",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
	pub code: RejectCode,
	pub reason: String,
}

/// A query that passed the gate, ready to be sent with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
	pub text: String,
	pub params: Map<String, Value>,
	pub clause_count: u32,
	pub max_depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Word(String),
	Str(String),
	Number(String),
	Param(String),
	Quoted(String),
	Punct(char),
}

pub fn cypher_gate(
	query: &str,
	params: &Map<String, Value>,
	cfg: &mnemo_config::Validator,
) -> Result<ValidatedQuery, Rejection> {
	let text = query.trim();

	if text.is_empty() {
		return Err(reject(RejectCode::RejectEmpty, "Query must be non-empty."));
	}
	if text.chars().count() > cfg.max_query_chars as usize {
		return Err(reject(
			RejectCode::RejectTooLong,
			format!("Query exceeds {} characters.", cfg.max_query_chars),
		));
	}

	let tokens = tokenize(text)?;

	check_balanced(&tokens)?;
	check_write_keywords(&tokens)?;
	check_leading_clause(&tokens)?;

	let shape = classify(&tokens, cfg)?;

	if shape.clause_count > cfg.max_clauses {
		return Err(reject(
			RejectCode::RejectTooComplex,
			format!("Query has {} clauses, above the limit of {}.", shape.clause_count, cfg.max_clauses),
		));
	}
	if shape.max_depth > cfg.max_traversal_depth {
		return Err(reject(
			RejectCode::RejectTooDeep,
			format!(
				"Query traverses {} hops, above the limit of {}.",
				shape.max_depth, cfg.max_traversal_depth
			),
		));
	}

	check_literals(&tokens, cfg)?;
	check_params(&tokens, params)?;

	Ok(ValidatedQuery {
		text: text.trim_end_matches(';').trim_end().to_string(),
		params: params.clone(),
		clause_count: shape.clause_count,
		max_depth: shape.max_depth,
	})
}

fn reject(code: RejectCode, reason: impl Into<String>) -> Rejection {
	Rejection { code, reason: reason.into() }
}

fn tokenize(query: &str) -> Result<Vec<Token>, Rejection> {
	let chars: Vec<char> = query.chars().collect();
	let mut tokens = Vec::new();
	let mut idx = 0;

	while idx < chars.len() {
		let ch = chars[idx];
		let next = chars.get(idx + 1).copied();

		if ch.is_whitespace() {
			idx += 1;

			continue;
		}

		match ch {
			'/' if matches!(next, Some('/') | Some('*')) => {
				return Err(reject(RejectCode::RejectComment, "Comments are not allowed."));
			},
			'\'' | '"' => {
				let (literal, end) = read_quoted(&chars, idx, "Unterminated string literal.")?;

				tokens.push(Token::Str(literal));

				idx = end;
			},
			'`' => {
				let (ident, end) = read_quoted(&chars, idx, "Unterminated quoted identifier.")?;

				tokens.push(Token::Quoted(ident));

				idx = end;
			},
			'$' => {
				if next == Some('{') {
					return Err(reject(
						RejectCode::RejectInjection,
						"Template interpolation \"${\" is not allowed.",
					));
				}

				let end = scan_word(&chars, idx + 1);

				if end == idx + 1 {
					return Err(reject(RejectCode::RejectSyntax, "A parameter name must follow '$'."));
				}

				tokens.push(Token::Param(chars[idx + 1..end].iter().collect()));

				idx = end;
			},
			'{' if next == Some('{') => {
				return Err(reject(
					RejectCode::RejectInjection,
					"Template interpolation \"{{\" is not allowed.",
				));
			},
			'%' if matches!(next, Some('s') | Some('(')) => {
				return Err(reject(
					RejectCode::RejectInjection,
					"Format placeholders are not allowed.",
				));
			},
			';' => {
				if chars[idx + 1..].iter().all(|c| c.is_whitespace() || *c == ';') {
					break;
				}

				return Err(reject(
					RejectCode::RejectMultipleStatements,
					"Only a single statement is allowed.",
				));
			},
			c if c.is_ascii_digit() => {
				let mut end = idx;

				while end < chars.len() && chars[end].is_ascii_digit() {
					end += 1;
				}

				tokens.push(Token::Number(chars[idx..end].iter().collect()));

				idx = end;
			},
			c if c.is_alphabetic() || c == '_' => {
				let end = scan_word(&chars, idx);

				tokens.push(Token::Word(chars[idx..end].iter().collect()));

				idx = end;
			},
			_ => {
				tokens.push(Token::Punct(ch));

				idx += 1;
			},
		}
	}

	Ok(tokens)
}

fn scan_word(chars: &[char], start: usize) -> usize {
	let mut end = start;

	while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
		end += 1;
	}

	end
}

fn read_quoted(
	chars: &[char],
	start: usize,
	unterminated: &str,
) -> Result<(String, usize), Rejection> {
	let quote = chars[start];
	let mut out = String::new();
	let mut idx = start + 1;

	while idx < chars.len() {
		let ch = chars[idx];

		if ch == '\\' && quote != '`' {
			if let Some(escaped) = chars.get(idx + 1) {
				out.push(*escaped);
			}

			idx += 2;

			continue;
		}
		if ch == quote {
			return Ok((out, idx + 1));
		}

		out.push(ch);

		idx += 1;
	}

	Err(reject(RejectCode::RejectSyntax, unterminated))
}

fn check_balanced(tokens: &[Token]) -> Result<(), Rejection> {
	let mut stack = Vec::new();

	for token in tokens {
		let Token::Punct(ch) = token else { continue };

		match ch {
			'(' | '[' | '{' => stack.push(*ch),
			')' | ']' | '}' => {
				let expected = match ch {
					')' => '(',
					']' => '[',
					_ => '{',
				};

				if stack.pop() != Some(expected) {
					return Err(reject(RejectCode::RejectSyntax, "Unbalanced brackets."));
				}
			},
			_ => {},
		}
	}

	if stack.is_empty() {
		Ok(())
	} else {
		Err(reject(RejectCode::RejectSyntax, "Unbalanced brackets."))
	}
}

/// Uppercased keyword at `idx`, unless the word is a property, label, or map key.
fn keyword_at(tokens: &[Token], idx: usize) -> Option<String> {
	let Some(Token::Word(word)) = tokens.get(idx) else { return None };

	if idx > 0 && matches!(tokens[idx - 1], Token::Punct('.') | Token::Punct(':')) {
		return None;
	}
	if matches!(tokens.get(idx + 1), Some(Token::Punct(':'))) {
		return None;
	}

	Some(word.to_ascii_uppercase())
}

fn check_write_keywords(tokens: &[Token]) -> Result<(), Rejection> {
	for idx in 0..tokens.len() {
		if let Some(keyword) = keyword_at(tokens, idx)
			&& WRITE_KEYWORDS.contains(&keyword.as_str())
		{
			return Err(reject(
				RejectCode::RejectWriteKeyword,
				format!("Write keyword {keyword} is not allowed."),
			));
		}
	}

	Ok(())
}

fn check_leading_clause(tokens: &[Token]) -> Result<(), Rejection> {
	let leading = keyword_at(tokens, 0);

	match leading.as_deref() {
		Some(keyword) if LEADING_CLAUSES.contains(&keyword) => Ok(()),
		Some(keyword) if DISALLOWED_CLAUSES.contains(&keyword) => Err(reject(
			RejectCode::RejectDisallowedClause,
			format!("Clause {keyword} is not in the read-only allow-list."),
		)),
		_ => Err(reject(
			RejectCode::RejectSyntax,
			"Query must begin with MATCH, OPTIONAL MATCH, WITH, or CALL.",
		)),
	}
}

struct QueryShape {
	clause_count: u32,
	max_depth: u32,
}

/// One open bracket. `opened_at` is the clause depth when it opened; `pattern` is set while the
/// innermost clause in this scope is a MATCH pattern.
struct Scope {
	opened_at: u32,
	pattern: bool,
}

struct Walk {
	clause_count: u32,
	clause_depth: u32,
	max_depth: u32,
	scopes: Vec<Scope>,
}
impl Walk {
	fn new() -> Self {
		Self {
			clause_count: 0,
			clause_depth: 0,
			max_depth: 0,
			scopes: vec![Scope { opened_at: 0, pattern: false }],
		}
	}

	fn begin_clause(&mut self, pattern: bool) {
		self.clause_count += 1;

		if self.scopes.len() == 1 {
			self.clause_depth = 0;
		}
		if let Some(scope) = self.scopes.last_mut() {
			scope.pattern = pattern;
		}
	}

	fn add_hops(&mut self, hops: u32) {
		self.clause_depth = self.clause_depth.saturating_add(hops);
		self.max_depth = self.max_depth.max(self.clause_depth);
	}

	fn open(&mut self, paren: bool) {
		let pattern = paren && self.in_pattern();

		self.scopes.push(Scope { opened_at: self.clause_depth, pattern });
	}

	/// Closes the innermost scope and returns the hops counted inside it.
	fn close(&mut self) -> u32 {
		if self.scopes.len() == 1 {
			return 0;
		}

		self.scopes
			.pop()
			.map(|scope| self.clause_depth.saturating_sub(scope.opened_at))
			.unwrap_or(0)
	}

	fn in_pattern(&self) -> bool {
		self.scopes.last().is_some_and(|scope| scope.pattern)
	}
}

fn classify(tokens: &[Token], cfg: &mnemo_config::Validator) -> Result<QueryShape, Rejection> {
	let mut walk = Walk::new();
	let mut idx = 0;

	while idx < tokens.len() {
		match &tokens[idx] {
			Token::Punct('-') => match tokens.get(idx + 1) {
				Some(Token::Punct('[')) => {
					let (hops, close) = relationship_hops(tokens, idx + 1)?;

					idx = arrow_end(tokens, close + 1);

					walk.add_hops(repeat_hops(tokens, &mut idx, hops)?);

					continue;
				},
				Some(Token::Punct('-')) => {
					idx = arrow_end(tokens, idx + 1);

					walk.add_hops(repeat_hops(tokens, &mut idx, 1)?);

					continue;
				},
				_ => {},
			},
			Token::Punct(open @ ('(' | '[' | '{')) => walk.open(*open == '('),
			Token::Punct(')') => {
				let inner = walk.close();

				idx += 1;

				if walk.in_pattern() {
					let repeated = repeat_hops(tokens, &mut idx, inner)?;

					walk.add_hops(repeated.saturating_sub(inner));
				}

				continue;
			},
			Token::Punct(']' | '}') => {
				walk.close();
			},
			_ => {},
		}

		let Some(keyword) = keyword_at(tokens, idx) else {
			idx += 1;

			continue;
		};

		match keyword.as_str() {
			"MATCH" => walk.begin_clause(true),
			"WHERE" | "RETURN" | "SKIP" | "LIMIT" | "YIELD" => walk.begin_clause(false),
			"WITH" => {
				let is_operator = idx > 0
					&& matches!(&tokens[idx - 1], Token::Word(prev)
						if prev.eq_ignore_ascii_case("STARTS") || prev.eq_ignore_ascii_case("ENDS"));

				if !is_operator {
					walk.begin_clause(false);
				}
			},
			"OPTIONAL" => {
				if keyword_at(tokens, idx + 1).as_deref() != Some("MATCH") {
					return Err(reject(RejectCode::RejectSyntax, "OPTIONAL must be followed by MATCH."));
				}

				walk.begin_clause(true);

				idx += 1;
			},
			"ORDER" => {
				let followed_by_by =
					matches!(tokens.get(idx + 1), Some(Token::Word(next)) if next.eq_ignore_ascii_case("BY"));

				if !followed_by_by {
					return Err(reject(RejectCode::RejectSyntax, "ORDER must be followed by BY."));
				}

				walk.begin_clause(false);

				idx += 1;
			},
			"CALL" => {
				let end = check_procedure(tokens, idx + 1, cfg)?;

				walk.begin_clause(false);

				idx = end;

				continue;
			},
			other if DISALLOWED_CLAUSES.contains(&other) => {
				return Err(reject(
					RejectCode::RejectDisallowedClause,
					format!("Clause {other} is not in the read-only allow-list."),
				));
			},
			other if follows_operand(tokens, idx) && !CLAUSE_POSITION_KEYWORDS.contains(&other) => {
				return Err(reject(
					RejectCode::RejectDisallowedClause,
					format!("Keyword {other} is not in the read-only allow-list."),
				));
			},
			_ => {},
		}

		idx += 1;
	}

	Ok(QueryShape { clause_count: walk.clause_count, max_depth: walk.max_depth })
}

/// Whether the token before `idx` completes an operand, which puts a word at `idx` in clause
/// or infix-operator position.
fn follows_operand(tokens: &[Token], idx: usize) -> bool {
	let Some(prev) = idx.checked_sub(1) else { return false };

	match &tokens[prev] {
		Token::Word(_) => keyword_at(tokens, prev)
			.is_none_or(|keyword| !OPERAND_KEYWORDS.contains(&keyword.as_str())),
		Token::Str(_) | Token::Number(_) | Token::Param(_) | Token::Quoted(_) => true,
		Token::Punct(ch) => matches!(ch, ')' | ']' | '}'),
	}
}

/// Index just past the tail of a relationship arrow starting at `idx`.
fn arrow_end(tokens: &[Token], mut idx: usize) -> usize {
	if tokens.get(idx) == Some(&Token::Punct('-')) {
		idx += 1;
	}
	if tokens.get(idx) == Some(&Token::Punct('>')) {
		idx += 1;
	}

	idx
}

/// Applies the path quantifier at `*idx`, if any, to a pattern element spanning `hops`.
fn repeat_hops(tokens: &[Token], idx: &mut usize, hops: u32) -> Result<u32, Rejection> {
	match quantifier_at(tokens, *idx)? {
		Some((upper, next)) => {
			*idx = next;

			Ok(hops.saturating_mul(upper))
		},
		None => Ok(hops),
	}
}

/// Reads a quantifier (`{n}`, `{m,n}`, `+`, `*`) at `idx` and returns its upper bound with the
/// index past it. A brace that does not hold a quantifier is a map and yields `None`.
fn quantifier_at(tokens: &[Token], idx: usize) -> Result<Option<(u32, usize)>, Rejection> {
	let unbounded = || {
		reject(
			RejectCode::RejectUnboundedTraversal,
			"Quantified path patterns must declare an upper bound.",
		)
	};

	match tokens.get(idx) {
		Some(Token::Punct('+' | '*')) => Err(unbounded()),
		Some(Token::Punct('{')) => {
			let mut cursor = idx + 1;
			let lower = number_at(tokens, cursor);

			if lower.is_some() {
				cursor += 1;
			}
			if tokens.get(cursor) == Some(&Token::Punct('}')) {
				return Ok(lower.map(|exact| (exact, cursor + 1)));
			}
			if tokens.get(cursor) != Some(&Token::Punct(',')) {
				return Ok(None);
			}

			cursor += 1;

			let upper = number_at(tokens, cursor);

			if upper.is_some() {
				cursor += 1;
			}
			if tokens.get(cursor) != Some(&Token::Punct('}')) {
				return Ok(None);
			}

			upper.map(|upper| Some((upper, cursor + 1))).ok_or_else(unbounded)
		},
		_ => Ok(None),
	}
}

/// Returns the hop upper bound of the relationship pattern opened at `open` and the index of
/// its closing bracket.
fn relationship_hops(tokens: &[Token], open: usize) -> Result<(u32, usize), Rejection> {
	let mut hops = 1;
	let mut braces = 0_u32;
	let mut idx = open + 1;

	while idx < tokens.len() {
		match &tokens[idx] {
			Token::Punct('{') => braces += 1,
			Token::Punct('}') => braces = braces.saturating_sub(1),
			Token::Punct(']') if braces == 0 => return Ok((hops, idx)),
			Token::Punct('*') if braces == 0 => {
				let (upper, next) = variable_length(tokens, idx + 1)?;

				hops = upper;
				idx = next;

				continue;
			},
			_ => {},
		}

		idx += 1;
	}

	Err(reject(RejectCode::RejectSyntax, "Unclosed relationship pattern."))
}

fn variable_length(tokens: &[Token], mut idx: usize) -> Result<(u32, usize), Rejection> {
	let unbounded = || {
		reject(
			RejectCode::RejectUnboundedTraversal,
			"Variable-length relationships must declare an upper bound.",
		)
	};
	let lower = number_at(tokens, idx);

	if lower.is_some() {
		idx += 1;
	}

	let is_range = tokens.get(idx) == Some(&Token::Punct('.'))
		&& tokens.get(idx + 1) == Some(&Token::Punct('.'));

	if !is_range {
		return lower.map(|hops| (hops, idx)).ok_or_else(unbounded);
	}

	idx += 2;

	number_at(tokens, idx).map(|upper| (upper, idx + 1)).ok_or_else(unbounded)
}

fn number_at(tokens: &[Token], idx: usize) -> Option<u32> {
	match tokens.get(idx) {
		Some(Token::Number(raw)) => Some(raw.parse().unwrap_or(u32::MAX)),
		_ => None,
	}
}

/// Checks the procedure named after `CALL` and returns the index just past its name.
fn check_procedure(
	tokens: &[Token],
	start: usize,
	cfg: &mnemo_config::Validator,
) -> Result<usize, Rejection> {
	if tokens.get(start) == Some(&Token::Punct('{')) {
		return Err(reject(RejectCode::RejectDisallowedClause, "CALL subqueries are not allowed."));
	}

	let mut name = String::new();
	let mut idx = start;

	loop {
		match tokens.get(idx) {
			Some(Token::Word(part) | Token::Quoted(part)) => name.push_str(part),
			_ => break,
		}

		idx += 1;

		if tokens.get(idx) != Some(&Token::Punct('.')) {
			break;
		}

		name.push('.');

		idx += 1;
	}

	if name.is_empty() || name.ends_with('.') {
		return Err(reject(RejectCode::RejectSyntax, "CALL must name a procedure."));
	}
	if !cfg.allowed_procedures.iter().any(|allowed| allowed == &name) {
		return Err(reject(
			RejectCode::RejectDisallowedProcedure,
			format!("Procedure {name} is not allowed."),
		));
	}

	Ok(idx)
}

fn check_literals(tokens: &[Token], cfg: &mnemo_config::Validator) -> Result<(), Rejection> {
	for (idx, token) in tokens.iter().enumerate() {
		match token {
			Token::Str(literal) => {
				if !cfg.allow_string_literals {
					return Err(reject(
						RejectCode::RejectStringLiteral,
						"String literals are not allowed. Pass values as parameters.",
					));
				}
				if contains_interpolation(literal) {
					return Err(reject(
						RejectCode::RejectInjection,
						"String literal contains an interpolation placeholder.",
					));
				}
			},
			Token::Punct('+') => {
				let touches_literal = (idx > 0 && matches!(tokens[idx - 1], Token::Str(_)))
					|| matches!(tokens.get(idx + 1), Some(Token::Str(_)));

				if touches_literal {
					return Err(reject(
						RejectCode::RejectInjection,
						"String concatenation in the query text is not allowed. Use a parameter.",
					));
				}
			},
			_ => {},
		}
	}

	Ok(())
}

fn check_params(tokens: &[Token], params: &Map<String, Value>) -> Result<(), Rejection> {
	for token in tokens {
		if let Token::Param(name) = token
			&& !params.contains_key(name)
		{
			return Err(reject(
				RejectCode::RejectMissingParam,
				format!("Parameter ${name} has no bound value."),
			));
		}
	}

	Ok(())
}

fn contains_interpolation(text: &str) -> bool {
	INTERPOLATION.is_match(text)
}
