//! # Relational-Rule Pass
//!
//! Declarative "if guard then expectation" rules over a path-query view of
//! one contract. A rule passes when its guard is false, or when guard and
//! expectation are both true. An expression that cannot be evaluated never
//! blocks certification: it yields one informational finding and the rule
//! is treated as vacuously passing.
//!
//! ## Query Language
//!
//! The supported subset, enough for the shipped rule set and the rule
//! libraries seen in the field:
//!
//! - `//PP_BRANCHE` — values of an attribute anywhere in the contract
//! - `//CA`, `//DR[DR_CODE = '6001']` — entity selection with an optional
//!   attribute predicate
//! - `count(path)`, `not(expr)`, `true()`
//! - comparisons `=`, `!=`, `<`, `<=`, `>`, `>=` (numeric when both sides
//!   parse as numbers, lexicographic otherwise)
//! - `and`, `or`, quoted string literals, numeric literals
//!
//! Comparisons against a selection are existential: one matching value is
//! enough. The source rule format's `if/then/else` is reduced to guard and
//! expectation; the `else` branch is always "true" in the rule sets this
//! validator ships with.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use afd_core::xml::{self, XmlElement, XmlError};
use afd_core::{Finding, Pass, Severity};
use afd_document::{Batch, Contract, EntityNode};

use crate::display_value;

const SOURCE: &str = "relational rules";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn default_severity() -> Severity {
    Severity::Error
}

fn default_enabled() -> bool {
    true
}

/// One relational rule: guard, expectation, and reporting metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Guard expression; false means the rule does not apply.
    pub condition: String,
    /// Expectation that must hold when the guard is true.
    pub then: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RelationRule {
    fn new(id: &str, name: &str, description: &str, condition: &str, then: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            condition: condition.into(),
            then: then.into(),
            severity: Severity::Error,
            category: String::new(),
            enabled: true,
        }
    }

    fn warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    fn category(mut self, category: &str) -> Self {
        self.category = category.into();
        self
    }
}

/// The shipped rule set.
pub fn builtin_rules() -> Vec<RelationRule> {
    vec![
        RelationRule::new(
            "VB-001",
            "High casco sum in Europe needs own risk",
            "a casco sum above 50000 with territory E requires an own risk above 1000",
            "//CA_VERZSOM > 50000 and //CA_GEBIED = 'E'",
            "//CA_ERB > 1000",
        )
        .category("casco"),
        RelationRule::new(
            "VB-002",
            "European territory needs sum and own risk",
            "territory E requires a casco sum above 30000 and an own risk above 1000",
            "//CA_GEBIED = 'E'",
            "//CA_VERZSOM > 30000 and //CA_ERB > 1000",
        )
        .category("casco"),
        RelationRule::new(
            "VB-003",
            "Casco cover requires third-party cover",
            "a CA entity without a WA entity is not insurable",
            "count(//CA) > 0",
            "count(//WA) > 0",
        )
        .category("casco"),
        RelationRule::new(
            "VB-004",
            "Legal assistance with motor vehicle",
            "motor branches (20-25) may not carry legal-assistance code 6001 as main cover",
            "//PP_BRANCHE >= 20 and //PP_BRANCHE <= 25",
            "count(//DR[DR_CODE = '6001']) = 0",
        )
        .category("coverage")
        .warning(),
        RelationRule::new(
            "VB-005",
            "Vehicle required for motor branches",
            "motor-vehicle insurance (branches 20-25) requires a PV entity",
            "//PP_BRANCHE >= 20 and //PP_BRANCHE <= 25",
            "count(//PV) > 0",
        )
        .category("object"),
        RelationRule::new(
            "VB-006",
            "No vehicle with contents cover",
            "contents insurance (branches 30-35) should not carry a PV entity",
            "//PP_BRANCHE >= 30 and //PP_BRANCHE <= 35",
            "count(//PV) = 0",
        )
        .category("object")
        .warning(),
        RelationRule::new(
            "VB-007",
            "Policyholder present",
            "every contract needs a party with role policyholder",
            "true()",
            "count(//VP[VP_RELCODE = 'VN' or VP_RELCODE = '01']) > 0",
        )
        .category("parties"),
        RelationRule::new(
            "VB-008",
            "Collection payment needs an account",
            "direct-debit payment requires an AD entity",
            "//PP_BETWIJZ = 'I'",
            "count(//AD) > 0",
        )
        .category("payment"),
        RelationRule::new(
            "VB-009",
            "Prolongation after start",
            "the prolongation date may not precede the start date",
            "//PP_PROLDAT and //PP_INGDAT",
            "//PP_PROLDAT >= //PP_INGDAT",
        )
        .category("dates"),
        RelationRule::new(
            "VB-010",
            "Coverage end after coverage start",
            "a DA end date may not precede its start date",
            "//DA_EINDDAT",
            "//DA_EINDDAT >= //DA_INGDAT",
        )
        .category("dates"),
        RelationRule::new(
            "VB-011",
            "Premium not negative",
            "outside cancellations the gross premium may not be negative",
            "//PP_MUTEFG != 'R'",
            "//PP_BTP >= 0",
        )
        .category("premium"),
        RelationRule::new(
            "VB-012",
            "Dutch contracts carry assurance tax",
            "contracts for Dutch parties should declare assurance tax",
            "//VP_LAND = 'NL' or //VP_LAND = 'NLD' or not(//VP_LAND)",
            "//PP_TASS or //PP_TASS = 0",
        )
        .category("premium")
        .warning(),
    ]
}

/// Load a rule library from its XML form. Rules without both expressions
/// are skipped; severity words map from the report vocabulary.
pub fn load_rules_xml(src: &str) -> Result<Vec<RelationRule>, XmlError> {
    let root = xml::parse(src)?;
    let mut rules = Vec::new();

    let elements: Vec<&XmlElement> = std::iter::once(&root)
        .chain(root.descendants())
        .filter(|el| el.name == "rule")
        .collect();
    for (index, element) in elements.iter().enumerate() {
        let text = |name: &str| {
            element.find(name).map(|c| c.text_trimmed().to_string()).unwrap_or_default()
        };
        let condition = text("condition");
        let then = text("then");
        if condition.is_empty() || then.is_empty() {
            continue;
        }

        let id = element
            .attr("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("XML-{:03}", index + 1));
        let severity = match text("severity").to_uppercase().as_str() {
            "WAARSCHUWING" | "WARNING" => Severity::Warning,
            "INFO" => Severity::Info,
            _ => Severity::Error,
        };
        rules.push(RelationRule {
            id,
            name: text("name"),
            description: text("description"),
            condition,
            then,
            severity,
            category: text("category"),
            enabled: element.attr("enabled") != Some("false"),
        });
    }
    Ok(rules)
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

/// Run every enabled rule against every contract.
pub fn check(batch: &Batch, rules: &[RelationRule]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for contract in &batch.contracts {
        for rule in rules.iter().filter(|r| r.enabled) {
            check_rule(contract, rule, &mut findings);
        }
    }
    findings
}

fn check_rule(contract: &Contract, rule: &RelationRule, findings: &mut Vec<Finding>) {
    let guard = match evaluate(&rule.condition, contract) {
        Ok(value) => value.truthy(),
        Err(err) => {
            findings.push(evaluation_error(contract, rule, &rule.condition, &err));
            return;
        }
    };
    if !guard {
        return;
    }

    match evaluate(&rule.then, contract) {
        Ok(value) if value.truthy() => {}
        Ok(_) => {
            let description = if rule.description.is_empty() {
                rule.name.clone()
            } else {
                rule.description.clone()
            };
            findings.push(
                Finding::builder(rule.severity, Pass::Relations, "EX-001", "relational_rule_failed")
                    .contract(&contract.number)
                    .branch(&contract.branch)
                    .entity(&rule.category)
                    .label(&rule.id)
                    .value(format!("if: {}", display_value(&rule.condition, 40)))
                    .description(description)
                    .expected(format!("then: {}", display_value(&rule.then, 40)))
                    .source(SOURCE)
                    .finish(),
            );
        }
        Err(err) => findings.push(evaluation_error(contract, rule, &rule.then, &err)),
    }
}

fn evaluation_error(
    contract: &Contract,
    rule: &RelationRule,
    expression: &str,
    err: &EvalError,
) -> Finding {
    Finding::builder(Severity::Info, Pass::Relations, "EX-002", "rule_evaluation_error")
        .contract(&contract.number)
        .branch(&contract.branch)
        .entity(&rule.category)
        .label(&rule.id)
        .value(display_value(expression, 50))
        .description(format!("rule {} could not be evaluated: {err}", rule.id))
        .expected("an expression in the supported query subset")
        .source(SOURCE)
        .finish()
}

// ---------------------------------------------------------------------------
// Expression evaluation
// ---------------------------------------------------------------------------

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unexpected character {character:?} at offset {offset}")]
    UnexpectedCharacter { character: char, offset: usize },

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("expression ends unexpectedly")]
    UnexpectedEnd,

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("count() needs a path argument")]
    CountNeedsSelection,

    #[error("entity selections cannot be compared by value")]
    EntityComparison,

    #[error("attribute reference {0:?} is only valid inside a predicate")]
    FieldOutsidePredicate(String),
}

/// Evaluate one expression against a contract.
pub fn evaluate<'a>(expression: &str, contract: &'a Contract) -> Result<Value<'a>, EvalError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, position: 0 };
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    eval(&expr, contract, None)
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Selected entities.
    Entities(Vec<&'a EntityNode>),
    /// Selected attribute values.
    Values(Vec<String>),
}

impl Value<'_> {
    /// Boolean coercion: selections are true when non-empty.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::Entities(e) => !e.is_empty(),
            Self::Values(v) => !v.is_empty(),
        }
    }
}

// -- tokens -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Ident(String),
    Literal(String),
    Number(f64),
    Compare(CmpOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                i += 2;
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                if i == start {
                    return Err(EvalError::UnexpectedCharacter { character: '/', offset: start });
                }
                tokens.push(Token::Path(chars[start..i].iter().collect()));
            }
            '\'' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(EvalError::UnterminatedString);
                }
                tokens.push(Token::Literal(chars[start..i].iter().collect()));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Compare(CmpOp::Ne));
                i += 2;
            }
            '=' => {
                tokens.push(Token::Compare(CmpOp::Eq));
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Compare(CmpOp::Le));
                    i += 2;
                } else {
                    tokens.push(Token::Compare(CmpOp::Lt));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Compare(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Compare(CmpOp::Gt));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse()
                    .map_err(|_| EvalError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(number));
            }
            c if is_name_char(c) => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(EvalError::UnexpectedCharacter { character: other, offset: i })
            }
        }
    }
    Ok(tokens)
}

// -- grammar ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path { name: String, predicate: Option<Box<Expr>> },
    /// Bare attribute name inside a predicate, resolved on the current node.
    Field(String),
    Literal(String),
    Number(f64),
    True,
    Count(Box<Expr>),
    Not(Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, EvalError> {
        let token = self.tokens.get(self.position).cloned().ok_or(EvalError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, token: Token) -> Result<(), EvalError> {
        let found = self.next()?;
        if found == token {
            Ok(())
        } else {
            Err(EvalError::UnexpectedToken(format!("{found:?}")))
        }
    }

    fn expect_end(&self) -> Result<(), EvalError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(EvalError::UnexpectedToken(format!("{token:?}"))),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_conjunction()?;
        while matches!(self.peek(), Some(Token::Ident(w)) if w == "or") {
            self.position += 1;
            let right = self.parse_conjunction()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_conjunction(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek(), Some(Token::Ident(w)) if w == "and") {
            self.position += 1;
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_primary()?;
        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.position += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next()? {
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Path(name) => {
                if self.peek() == Some(&Token::LBracket) {
                    self.position += 1;
                    let predicate = self.parse_expression()?;
                    self.expect(Token::RBracket)?;
                    Ok(Expr::Path { name, predicate: Some(Box::new(predicate)) })
                } else {
                    Ok(Expr::Path { name, predicate: None })
                }
            }
            Token::Literal(text) => Ok(Expr::Literal(text)),
            Token::Number(number) => Ok(Expr::Number(number)),
            Token::Ident(word) => match word.as_str() {
                "true" => {
                    self.expect(Token::LParen)?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::True)
                }
                "not" => {
                    self.expect(Token::LParen)?;
                    let inner = self.parse_expression()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::Not(Box::new(inner)))
                }
                "count" => {
                    self.expect(Token::LParen)?;
                    let inner = self.parse_expression()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::Count(Box::new(inner)))
                }
                _ if self.peek() == Some(&Token::LParen) => {
                    Err(EvalError::UnknownFunction(word))
                }
                _ => Ok(Expr::Field(word)),
            },
            other => Err(EvalError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

// -- evaluation -------------------------------------------------------------

/// Entity kinds are bare two-character names; everything else addresses
/// attribute values.
fn is_entity_name(name: &str) -> bool {
    name.len() == 2 && !name.contains('_')
}

fn eval<'a>(
    expr: &Expr,
    contract: &'a Contract,
    node: Option<&'a EntityNode>,
) -> Result<Value<'a>, EvalError> {
    match expr {
        Expr::Literal(text) => Ok(Value::Text(text.clone())),
        Expr::Number(number) => Ok(Value::Number(*number)),
        Expr::True => Ok(Value::Bool(true)),
        Expr::Field(name) => {
            let Some(node) = node else {
                return Err(EvalError::FieldOutsidePredicate(name.clone()));
            };
            Ok(Value::Values(
                node.attributes.get(name).map(|v| v.trim().to_string()).into_iter().collect(),
            ))
        }
        Expr::Path { name, predicate } => {
            if is_entity_name(name) {
                let mut selected = Vec::new();
                for entity in contract.entities_of_type_recursive(name) {
                    let keep = match predicate {
                        Some(predicate) => eval(predicate, contract, Some(entity))?.truthy(),
                        None => true,
                    };
                    if keep {
                        selected.push(entity);
                    }
                }
                Ok(Value::Entities(selected))
            } else {
                let mut values = Vec::new();
                for entity in contract.all_entities() {
                    let Some(value) = entity.attributes.get(name) else { continue };
                    let keep = match predicate {
                        Some(predicate) => eval(predicate, contract, Some(entity))?.truthy(),
                        None => true,
                    };
                    if keep {
                        values.push(value.trim().to_string());
                    }
                }
                Ok(Value::Values(values))
            }
        }
        Expr::Count(inner) => match eval(inner, contract, node)? {
            Value::Entities(entities) => Ok(Value::Number(entities.len() as f64)),
            Value::Values(values) => Ok(Value::Number(values.len() as f64)),
            _ => Err(EvalError::CountNeedsSelection),
        },
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, contract, node)?.truthy())),
        Expr::And(left, right) => Ok(Value::Bool(
            eval(left, contract, node)?.truthy() && eval(right, contract, node)?.truthy(),
        )),
        Expr::Or(left, right) => Ok(Value::Bool(
            eval(left, contract, node)?.truthy() || eval(right, contract, node)?.truthy(),
        )),
        Expr::Compare(left, op, right) => {
            let left = scalar_candidates(eval(left, contract, node)?)?;
            let right = scalar_candidates(eval(right, contract, node)?)?;
            // Existential semantics: one satisfying pair is enough.
            let hit = left
                .iter()
                .any(|l| right.iter().any(|r| compare_scalars(l, *op, r)));
            Ok(Value::Bool(hit))
        }
    }
}

fn scalar_candidates(value: Value<'_>) -> Result<Vec<String>, EvalError> {
    match value {
        Value::Bool(b) => Ok(vec![b.to_string()]),
        Value::Number(n) => Ok(vec![format_number(n)]),
        Value::Text(s) => Ok(vec![s]),
        Value::Values(v) => Ok(v),
        Value::Entities(_) => Err(EvalError::EntityComparison),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn compare_scalars(left: &str, op: CmpOp, right: &str) -> bool {
    let ordering = match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r),
        _ => Some(left.cmp(right)),
    };
    let Some(ordering) = ordering else { return false };
    match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
