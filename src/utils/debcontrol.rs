use crate::types::{Atom, Expression, ExpressionError, Relation, Version};

use anyhow::{format_err, Result};
use debcontrol::{BufParse, Paragraph, Streaming};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, opt, value},
    sequence::{delimited, pair, preceded, separated_pair},
    IResult,
};
use std::{collections::HashMap, io::Read};

/// One paragraph of a control file. Field names are matched case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(|value| value.as_str())
    }

    fn from_paragraph(paragraph: Paragraph) -> Self {
        let fields = paragraph
            .fields
            .into_iter()
            .map(|field| (field.name.to_ascii_lowercase(), field.value))
            .collect();
        Record { fields }
    }

    #[cfg(test)]
    pub fn from_fields(fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();
        Record { fields }
    }
}

/// Stream every paragraph out of a control file such as `Packages`.
pub fn read_records(r: impl Read) -> Result<Vec<Record>> {
    let mut buf_parse = BufParse::new(r, 16384);
    let mut records = Vec::new();
    while let Some(result) = buf_parse
        .try_next()
        .map_err(|e| format_err!("Malformed control file: {:?}", e))?
    {
        match result {
            Streaming::Item(paragraph) => records.push(Record::from_paragraph(paragraph)),
            Streaming::Incomplete => buf_parse.buffer()?,
        }
    }

    Ok(records)
}

pub fn parse_records(s: &str) -> Result<Vec<Record>> {
    let paragraphs =
        debcontrol::parse_str(s).map_err(|e| format_err!("Malformed control file: {:?}", e))?;
    Ok(paragraphs.into_iter().map(Record::from_paragraph).collect())
}

// parser combinators
fn parse_package_name(s: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && !matches!(c, '(' | ')' | ',' | '|'))(s)
}

fn parse_relation(s: &str) -> IResult<&str, Relation> {
    alt((
        value(Relation::Earlier, tag("<<")),
        value(Relation::EarlierEqual, tag("<=")),
        value(Relation::LaterEqual, tag(">=")),
        value(Relation::Later, tag(">>")),
        value(Relation::Exactly, tag("=")),
    ))(s)
}

fn parse_version(s: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')')(s)
}

fn parse_constraint(s: &str) -> IResult<&str, (Relation, &str)> {
    preceded(
        multispace0,
        delimited(
            pair(char('('), multispace0),
            separated_pair(parse_relation, multispace0, parse_version),
            pair(multispace0, char(')')),
        ),
    )(s)
}

fn parse_atom_parts(s: &str) -> IResult<&str, (&str, Option<(Relation, &str)>)> {
    all_consuming(pair(parse_package_name, opt(parse_constraint)))(s)
}

fn parse_atom(s: &str, term: &str) -> Result<Atom, ExpressionError> {
    if s.is_empty() {
        return Err(ExpressionError::Empty(term.to_string()));
    }
    let (_, (name, constraint)) =
        parse_atom_parts(s).map_err(|_| ExpressionError::Malformed(s.to_string()))?;
    // Architecture qualifiers are not modeled, `:any` is the only one we understand
    let package = name.strip_suffix(":any").unwrap_or(name).to_string();
    let constraint = match constraint {
        Some((relation, version)) => {
            let version =
                version
                    .parse::<Version>()
                    .map_err(|source| ExpressionError::Version {
                        relation: s.to_string(),
                        source,
                    })?;
            Some((relation, version))
        }
        None => None,
    };

    Ok(Atom {
        package,
        constraint,
    })
}

fn parse_alternatives(term: &str) -> Result<Expression, ExpressionError> {
    let mut atoms = term
        .split('|')
        .map(|atom| parse_atom(atom.trim(), term))
        .collect::<Result<Vec<Atom>, ExpressionError>>()?;
    if atoms.len() == 1 {
        Ok(Expression::Atom(atoms.remove(0)))
    } else {
        Ok(Expression::Alternatives(atoms))
    }
}

/// Parse `a (>= 1), b | c` into expressions: commas are AND, pipes are OR.
pub fn parse_relation_list(s: &str) -> Result<Vec<Expression>, ExpressionError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }

    s.split(',')
        .map(|term| parse_alternatives(term.trim()))
        .collect()
}
