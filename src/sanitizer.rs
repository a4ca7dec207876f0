//! Cleanup and guarding of model-generated SQL.
//!
//! `sanitize` only strips presentation artifacts (code fences, backticks,
//! surrounding whitespace). `SqlGuard` then admits a single read-only query
//! over the session's table before anything reaches the engine.

use crate::error::GenerationError;
use regex::Regex;
use sqlparser::ast::{visit_relations, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A statement that passed sanitization and guarding. Always ends with `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery(String);

impl GeneratedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl std::fmt::Display for GeneratedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn sql_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?i)```sql").expect("static regex"))
}

/// Strip code fences and backticks from raw model output.
pub fn sanitize(raw: &str) -> Result<String, GenerationError> {
    let cleaned = sql_fence().replace_all(raw, "");
    let cleaned = cleaned.replace("```", "").replace('`', "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Err(GenerationError::EmptyGeneratedQuery);
    }
    Ok(cleaned.to_string())
}

/// Statement kinds that may never reach the engine.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "DROP", "CREATE", "ALTER", "TRUNCATE",
    "ATTACH", "DETACH", "COPY", "PRAGMA", "INSTALL", "LOAD", "EXPORT", "IMPORT", "GRANT",
    "REVOKE", "CALL", "EXECUTE", "SET", "VACUUM",
];

pub struct SqlGuard {
    table_name: String,
}

impl SqlGuard {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    /// Admit `sql` if it is one read-only query over the guarded table.
    ///
    /// Text the parser cannot read falls back to a keyword check; the engine
    /// then reports the syntax problem itself.
    pub fn check(&self, sql: &str) -> Result<GeneratedQuery, GenerationError> {
        let body = sql.trim().trim_end_matches(';').trim_end();
        if body.is_empty() {
            return Err(GenerationError::EmptyGeneratedQuery);
        }

        match Parser::parse_sql(&GenericDialect {}, body) {
            Ok(statements) => self.check_statements(&statements, body)?,
            Err(e) => {
                debug!("SQL parser rejected generated text ({}), using keyword guard", e);
                self.check_keywords(body)?;
            }
        }

        Ok(GeneratedQuery(format!("{};", body)))
    }

    fn check_statements(&self, statements: &[Statement], body: &str) -> Result<(), GenerationError> {
        if statements.len() != 1 {
            return Err(GenerationError::MultipleStatements(statements.len()));
        }

        let query = match &statements[0] {
            Statement::Query(query) => query,
            _ => return Err(GenerationError::NotReadOnly(leading_keyword(body))),
        };

        if let SetExpr::Select(select) = query.body.as_ref() {
            if select.into.is_some() {
                return Err(GenerationError::NotReadOnly("SELECT INTO".to_string()));
            }
        }

        let mut allowed: HashSet<String> = HashSet::new();
        allowed.insert(self.table_name.to_lowercase());
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                allowed.insert(cte.alias.name.value.to_lowercase());
            }
        }

        let outcome = visit_relations(&statements[0], |relation| {
            let name = relation
                .0
                .last()
                .map(|ident| ident.value.to_lowercase())
                .unwrap_or_default();
            if relation.0.len() == 1 && allowed.contains(&name) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(relation.to_string())
            }
        });

        if let ControlFlow::Break(table) = outcome {
            warn!("Rejected generated SQL referencing '{}'", table);
            return Err(GenerationError::ForeignTable(table));
        }
        Ok(())
    }

    fn check_keywords(&self, body: &str) -> Result<(), GenerationError> {
        if body.contains(';') {
            return Err(GenerationError::MultipleStatements(body.split(';').count()));
        }

        let first = leading_keyword(body);
        if first != "SELECT" && first != "WITH" {
            return Err(GenerationError::NotReadOnly(first));
        }

        let forbidden = body
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map(|word| word.to_ascii_uppercase())
            .find(|word| FORBIDDEN_KEYWORDS.contains(&word.as_str()));
        if let Some(word) = forbidden {
            return Err(GenerationError::NotReadOnly(word));
        }

        self.check_relation_words(body)
    }

    /// Every name after FROM or JOIN must be the guarded table or a CTE
    /// declared in the text. Table functions and quoted paths are refused.
    fn check_relation_words(&self, body: &str) -> Result<(), GenerationError> {
        let text = string_literal().replace_all(body, "''");

        let mut allowed: HashSet<String> = cte_name()
            .captures_iter(&text)
            .map(|caps| caps[1].to_lowercase())
            .collect();
        allowed.insert(self.table_name.to_lowercase());

        for caps in relation_word().captures_iter(&text) {
            let word = &caps[1];
            let name = word.trim_matches('"').to_lowercase();
            let is_call = caps.get(2).is_some();
            if is_call || word.starts_with('\'') || !allowed.contains(&name) {
                warn!("Rejected generated SQL referencing '{}'", word);
                return Err(GenerationError::ForeignTable(word.to_string()));
            }
        }
        Ok(())
    }
}

fn string_literal() -> &'static Regex {
    static LITERAL: OnceLock<Regex> = OnceLock::new();
    LITERAL.get_or_init(|| Regex::new(r"'(?:[^']|'')*'").expect("static regex"))
}

/// First token after FROM/JOIN unless it opens a subquery, plus a trailing `(`.
fn relation_word() -> &'static Regex {
    static RELATION: OnceLock<Regex> = OnceLock::new();
    RELATION.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:FROM|JOIN)\s+([^\s,()]+)(\s*\()?"#).expect("static regex")
    })
}

fn cte_name() -> &'static Regex {
    static CTE: OnceLock<Regex> = OnceLock::new();
    CTE.get_or_init(|| {
        Regex::new(r#"(?i)(?:\bWITH(?:\s+RECURSIVE)?|,)\s+"?([A-Za-z_][A-Za-z0-9_]*)"?\s+AS\s*\("#)
            .expect("static regex")
    })
}

fn leading_keyword(sql: &str) -> String {
    sql.trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}
