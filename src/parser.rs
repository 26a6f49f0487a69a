use crate::ast::*;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_until, take_while},
    character::complete::{char, digit1, multispace1, one_of},
    combinator::{all_consuming, cut, map, map_res, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::{fold_many0, many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;
use tracing::instrument;

/// Syntax error in a configuration document or expression.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn at(source: &str, remaining: &str, code: ErrorKind) -> Self {
        let offset = source.len().saturating_sub(remaining.len());
        let consumed = &source[..offset];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed
            .rsplit('\n')
            .next()
            .map(|l| l.chars().count())
            .unwrap_or(0)
            + 1;
        let message = if remaining.is_empty() {
            "unexpected end of input".to_string()
        } else {
            let snippet: String = remaining.chars().take(16).collect();
            format!("unexpected {:?} ({:?})", snippet, code)
        };
        Self {
            line,
            column,
            message,
        }
    }

    fn from_nom(source: &str, err: nom::Err<NomError<&str>>) -> Self {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => Self::at(source, e.input, e.code),
            nom::Err::Incomplete(_) => Self::at(source, "", ErrorKind::Eof),
        }
    }
}

/// Parses a whole configuration document into its root [`Body`].
#[instrument(level = "debug", skip(source))]
pub fn parse_document(source: &str) -> Result<Body, ParseError> {
    all_consuming(delimited(sp, parse_body, sp))(source)
        .map(|(_, body)| body)
        .map_err(|e| ParseError::from_nom(source, e))
}

/// Parses a single standalone expression, e.g. `eq(header("x"), "y")`.
pub fn parse_expression_str(source: &str) -> Result<Expression, ParseError> {
    all_consuming(delimited(sp, parse_expression, sp))(source)
        .map(|(_, expr)| expr)
        .map_err(|e| ParseError::from_nom(source, e))
}

enum BodyItem {
    Attribute(Attribute),
    Block(Block),
}

fn parse_body(input: &str) -> IResult<&str, Body> {
    map(many0(ws(parse_body_item)), |items| {
        let mut body = Body::default();
        for item in items {
            match item {
                BodyItem::Attribute(a) => body.attributes.push(a),
                BodyItem::Block(b) => body.blocks.push(b),
            }
        }
        body
    })(input)
}

fn parse_body_item(input: &str) -> IResult<&str, BodyItem> {
    alt((
        map(parse_attribute, BodyItem::Attribute),
        map(parse_block, BodyItem::Block),
    ))(input)
}

fn parse_attribute(input: &str) -> IResult<&str, Attribute> {
    map(
        tuple((identifier, sp, char('='), cut(ws(parse_expression)))),
        |(name, _, _, expr)| Attribute {
            name: name.to_string(),
            expr,
        },
    )(input)
}

#[instrument(level = "debug", skip(input))]
fn parse_block(input: &str) -> IResult<&str, Block> {
    map(
        tuple((
            identifier,
            many0(preceded(sp, parse_label)),
            block(parse_body),
        )),
        |(kind, labels, body)| Block {
            kind: kind.to_string(),
            labels,
            body,
        },
    )(input)
}

fn parse_label(input: &str) -> IResult<&str, String> {
    alt((parse_plain_string, map(identifier, str::to_string)))(input)
}

/// Expressions
pub fn parse_expression(input: &str) -> IResult<&str, Expression> {
    let (input, base) = parse_primary(input)?;
    fold_many0(
        preceded(sp, parse_traversal),
        move || base.clone(),
        |target, step| match step {
            Traversal::Attr(name) => Expression::GetAttr {
                target: Box::new(target),
                name,
            },
            Traversal::Index(key) => Expression::Index {
                target: Box::new(target),
                key: Box::new(key),
            },
        },
    )(input)
}

enum Traversal {
    Attr(String),
    Index(Expression),
}

fn parse_traversal(input: &str) -> IResult<&str, Traversal> {
    alt((
        preceded(
            char('.'),
            alt((
                map(identifier, |name| Traversal::Attr(name.to_string())),
                map(map_res(digit1, str::parse::<i64>), |i| {
                    Traversal::Index(Expression::Literal(Literal::Integer(i)))
                }),
            )),
        ),
        map(
            delimited(char('['), ws(parse_expression), char(']')),
            Traversal::Index,
        ),
    ))(input)
}

fn parse_primary(input: &str) -> IResult<&str, Expression> {
    alt((
        map(parse_number, Expression::Literal),
        parse_template,
        parse_list,
        parse_object,
        delimited(char('('), ws(parse_expression), char(')')),
        parse_call_or_name,
    ))(input)
}

fn parse_call_or_name(input: &str) -> IResult<&str, Expression> {
    let (rest, name) = identifier(input)?;
    match preceded(sp, parse_arguments)(rest) {
        Ok((rest, arguments)) => return Ok((rest, Expression::call(name, arguments))),
        Err(nom::Err::Error(_)) => {}
        Err(e) => return Err(e),
    }
    let expr = match name {
        "true" => Expression::Literal(Literal::Boolean(true)),
        "false" => Expression::Literal(Literal::Boolean(false)),
        "null" => Expression::Literal(Literal::Null),
        _ => Expression::Variable(name.to_string()),
    };
    Ok((rest, expr))
}

fn parse_arguments(input: &str) -> IResult<&str, Vec<Expression>> {
    preceded(
        char('('),
        cut(terminated(
            separated_list0(char(','), ws(parse_expression)),
            pair(opt(ws(char(','))), preceded(sp, char(')'))),
        )),
    )(input)
}

fn parse_list(input: &str) -> IResult<&str, Expression> {
    map(
        preceded(
            char('['),
            cut(terminated(
                separated_list0(char(','), ws(parse_expression)),
                pair(opt(ws(char(','))), preceded(sp, char(']'))),
            )),
        ),
        Expression::List,
    )(input)
}

fn parse_object(input: &str) -> IResult<&str, Expression> {
    map(
        preceded(
            char('{'),
            cut(terminated(many0(ws(parse_object_item)), preceded(sp, char('}')))),
        ),
        Expression::Object,
    )(input)
}

fn parse_object_item(input: &str) -> IResult<&str, (String, Expression)> {
    map(
        tuple((
            alt((parse_plain_string, map(identifier, str::to_string))),
            ws(alt((char('='), char(':')))),
            parse_expression,
            opt(preceded(sp, char(','))),
        )),
        |(key, _, value, _)| (key, value),
    )(input)
}

/// Basic Elements
fn parse_number(input: &str) -> IResult<&str, Literal> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| {
            if s.contains(|c| matches!(c, '.' | 'e' | 'E')) {
                s.parse::<f64>().map(Literal::Float).map_err(|_| ())
            } else {
                s.parse::<i64>().map(Literal::Integer).map_err(|_| ())
            }
        },
    )(input)
}

/// A quoted string without interpolation, used for labels and object keys.
fn parse_plain_string(input: &str) -> IResult<&str, String> {
    let (rest, expr) = parse_template(input)?;
    match expr {
        Expression::Literal(Literal::String(s)) => Ok((rest, s)),
        _ => Err(nom::Err::Error(NomError::new(input, ErrorKind::Verify))),
    }
}

/// A quoted string. Returns a plain string literal when there is no
/// interpolation, otherwise a [`Expression::Template`].
fn parse_template(input: &str) -> IResult<&str, Expression> {
    let (mut rest, _) = char('"')(input)?;
    let mut parts = vec![];
    let mut text = String::new();

    loop {
        if let Some(r) = rest.strip_prefix('"') {
            rest = r;
            break;
        }
        if let Some(r) = rest.strip_prefix("$${") {
            text.push_str("${");
            rest = r;
            continue;
        }
        if let Some(r) = rest.strip_prefix("${") {
            if !text.is_empty() {
                parts.push(TemplatePart::Text(std::mem::take(&mut text)));
            }
            let (r, expr) = cut(terminated(ws(parse_expression), char('}')))(r)?;
            parts.push(TemplatePart::Interpolation(expr));
            rest = r;
            continue;
        }
        if let Some(r) = rest.strip_prefix('\\') {
            let mut chars = r.chars();
            let escaped = match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('"') => '"',
                Some('\\') => '\\',
                _ => return Err(nom::Err::Failure(NomError::new(rest, ErrorKind::Escaped))),
            };
            text.push(escaped);
            rest = chars.as_str();
            continue;
        }
        let mut chars = rest.chars();
        match chars.next() {
            Some('\n') | None => {
                return Err(nom::Err::Failure(NomError::new(rest, ErrorKind::Char)));
            }
            Some(c) => {
                text.push(c);
                rest = chars.as_str();
            }
        }
    }

    if parts.is_empty() {
        return Ok((rest, Expression::Literal(Literal::String(text))));
    }
    if !text.is_empty() {
        parts.push(TemplatePart::Text(text));
    }
    Ok((rest, Expression::Template(parts)))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    let id_chars = |c: char| c.is_alphanumeric() || c == '_' || c == '-';
    let start_chars = |c: char| c.is_alphabetic() || c == '_';

    recognize(pair(
        nom::bytes::complete::take_while_m_n(1, 1, start_chars),
        take_while(id_chars),
    ))(input)
}

/// Braced block body: `{ inner }`.
fn block<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    preceded(
        ws(char('{')),
        cut(terminated(inner, preceded(sp, char('}')))),
    )
}

/// Whitespace and comment skipping.
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(sp, inner, sp)
}

fn sp(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value(
                (),
                pair(alt((tag("#"), tag("//"))), take_till(|c| c == '\n')),
            ),
            value((), tuple((tag("/*"), take_until("*/"), tag("*/")))),
        ))),
    )(input)
}
