// crates/netharvest-core/src/core/template.rs
// ============================================================================
// Module: Netharvest Template Engine
// Description: Structured-text extraction templates over raw CLI transcripts.
// Purpose: Turn prompt-bounded command output into field records for scoring.
// Dependencies: regex, serde, thiserror
// ============================================================================

//! ## Overview
//! Templates follow the conventional structured-text dialect: a block of
//! `Value` declarations followed by named states holding ordered match rules.
//! `${NAME}` interpolates a value's pattern as a named capture group. The
//! engine supports the `Filldown`, `Required`, and `List` value options and
//! the `Record`, `Next`, and `Continue` rule actions, which covers the show-
//! command templates this collector consumes.
//!
//! Every emitted record carries all declared fields; unmatched fields hold
//! empty values so downstream scoring can measure population honestly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Template Record Types
// ============================================================================

/// A single extracted field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar value captured by a plain or `Filldown` field.
    Single(String),
    /// Accumulated values captured by a `List` field.
    List(Vec<String>),
}

impl FieldValue {
    /// Returns whether the value holds no captured text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Single(value) => value.is_empty(),
            Self::List(values) => values.is_empty(),
        }
    }
}

/// One extracted record: field name to captured value.
pub type Record = BTreeMap<String, FieldValue>;

/// Stored template row consumed read-only at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    /// Conventional `vendor_os_command` identifier.
    pub identifier: String,
    /// Template body text.
    pub body: String,
    /// Deduplication hash of the normalized body.
    pub dedup_hash: String,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while compiling a template body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `Value` line did not parse.
    #[error("malformed value declaration on line {0}: {1}")]
    BadValue(usize, String),
    /// A value option is not supported.
    #[error("unsupported value option {1:?} on line {0}")]
    BadOption(usize, String),
    /// A rule referenced an undeclared value.
    #[error("rule references undeclared value ${{{0}}}")]
    UnknownValue(String),
    /// A rule pattern failed regex compilation.
    #[error("rule pattern failed to compile on line {0}: {1}")]
    BadPattern(usize, String),
    /// A rule action is not supported.
    #[error("unsupported rule action {1:?} on line {0}")]
    BadAction(usize, String),
    /// A rule switched to a state that does not exist.
    #[error("rule targets undefined state {1:?} on line {0}")]
    UnknownState(usize, String),
    /// The template has no states or no rules.
    #[error("template has no executable rules")]
    Empty,
}

// ============================================================================
// SECTION: Value Declarations
// ============================================================================

/// Declared extraction field.
#[derive(Debug, Clone)]
struct ValueDef {
    /// Field name.
    name: String,
    /// Raw pattern from the declaration, without the outer parentheses.
    pattern: String,
    /// Value persists across records until overwritten.
    filldown: bool,
    /// Record is suppressed unless this value is set.
    required: bool,
    /// Value accumulates into a list across matches.
    list: bool,
}

/// Parses one `Value` declaration line.
fn parse_value_line(line_no: usize, line: &str) -> Result<ValueDef, TemplateError> {
    let rest = line.trim_start_matches("Value").trim_start();
    let open = rest
        .find('(')
        .ok_or_else(|| TemplateError::BadValue(line_no, "missing pattern".to_string()))?;
    let close = rest
        .rfind(')')
        .filter(|end| *end > open)
        .ok_or_else(|| TemplateError::BadValue(line_no, "unterminated pattern".to_string()))?;
    let pattern = rest[open + 1 .. close].to_string();
    let head: Vec<&str> = rest[.. open].split_whitespace().collect();
    let Some((name, options)) = head.split_last() else {
        return Err(TemplateError::BadValue(line_no, "missing field name".to_string()));
    };
    let mut def = ValueDef {
        name: (*name).to_string(),
        pattern,
        filldown: false,
        required: false,
        list: false,
    };
    for option in options {
        match *option {
            "Filldown" => def.filldown = true,
            "Required" => def.required = true,
            "List" => def.list = true,
            // Key affects downstream table joins, not extraction.
            "Key" => {}
            other => return Err(TemplateError::BadOption(line_no, other.to_string())),
        }
    }
    if def.name.is_empty() || !def.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TemplateError::BadValue(line_no, format!("bad field name {:?}", def.name)));
    }
    Ok(def)
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Rule action after a pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleAction {
    /// Emit the current row (if required fields are set) and clear it.
    Record,
    /// Move to the next input line.
    Next,
    /// Keep matching subsequent rules against the same line.
    Continue,
}

/// One compiled match rule.
#[derive(Debug, Clone)]
struct Rule {
    /// Compiled pattern with value interpolations as named groups.
    regex: Regex,
    /// Action taken on match.
    action: RuleAction,
    /// Optional state transition taken on match.
    next_state: Option<String>,
}

/// Splits a rule line into its pattern and `->` clause.
fn split_rule(line: &str) -> (&str, Option<&str>) {
    match line.rfind(" -> ") {
        Some(at) => (line[.. at].trim_end(), Some(line[at + 4 ..].trim())),
        None => (line, None),
    }
}

/// Parses the `-> action [state]` clause of a rule.
fn parse_action(
    line_no: usize,
    clause: Option<&str>,
) -> Result<(RuleAction, Option<String>), TemplateError> {
    let Some(clause) = clause else {
        return Ok((RuleAction::Next, None));
    };
    let mut parts = clause.split_whitespace();
    let first = parts.next().unwrap_or("");
    let second = parts.next();
    if parts.next().is_some() {
        return Err(TemplateError::BadAction(line_no, clause.to_string()));
    }
    let (action, state) = match first {
        "Record" => (RuleAction::Record, second),
        "Next" => (RuleAction::Next, second),
        "Continue" if second.is_none() => (RuleAction::Continue, None),
        // A bare word is a state transition with the default action.
        state if second.is_none() && !state.is_empty() => (RuleAction::Next, Some(state)),
        _ => return Err(TemplateError::BadAction(line_no, clause.to_string())),
    };
    Ok((action, state.map(str::to_string)))
}

/// Interpolates `${NAME}` references into named capture groups.
fn interpolate(
    pattern: &str,
    values: &BTreeMap<String, ValueDef>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[.. start]);
        let tail = &rest[start + 2 ..];
        let Some(end) = tail.find('}') else {
            // No closing brace; treat the remainder literally.
            out.push_str(&rest[start ..]);
            rest = "";
            break;
        };
        let name = &tail[.. end];
        let def = values.get(name).ok_or_else(|| TemplateError::UnknownValue(name.to_string()))?;
        out.push_str("(?P<");
        out.push_str(name);
        out.push('>');
        out.push_str(&def.pattern);
        out.push(')');
        rest = &tail[end + 1 ..];
    }
    out.push_str(rest);
    Ok(out)
}

// ============================================================================
// SECTION: Compiled Template
// ============================================================================

/// Compiled template ready to run against transcripts.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    /// Declared values in declaration order.
    values: Vec<ValueDef>,
    /// States in declaration order, keyed by name.
    states: Vec<(String, Vec<Rule>)>,
}

impl CompiledTemplate {
    /// Compiles a template body.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] naming the first malformed declaration,
    /// rule, or transition.
    pub fn compile(body: &str) -> Result<Self, TemplateError> {
        let mut values: Vec<ValueDef> = Vec::new();
        let mut by_name: BTreeMap<String, ValueDef> = BTreeMap::new();
        let mut states: Vec<(String, Vec<(usize, String)>)> = Vec::new();

        for (index, raw) in body.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end();
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            if line.starts_with("Value ") {
                let def = parse_value_line(line_no, line)?;
                by_name.insert(def.name.clone(), def.clone());
                values.push(def);
            } else if !line.starts_with(' ') && !line.starts_with('\t') {
                states.push((line.trim().to_string(), Vec::new()));
            } else {
                let Some((_, rules)) = states.last_mut() else {
                    return Err(TemplateError::BadPattern(
                        line_no,
                        "rule outside any state".to_string(),
                    ));
                };
                rules.push((line_no, line.trim().to_string()));
            }
        }

        let state_names: Vec<String> = states.iter().map(|(name, _)| name.clone()).collect();
        let mut compiled_states = Vec::with_capacity(states.len());
        for (name, raw_rules) in states {
            let mut rules = Vec::with_capacity(raw_rules.len());
            for (line_no, raw_rule) in raw_rules {
                let (pattern, clause) = split_rule(&raw_rule);
                let (action, next_state) = parse_action(line_no, clause)?;
                if let Some(target) = &next_state
                    && !state_names.iter().any(|s| s == target)
                {
                    return Err(TemplateError::UnknownState(line_no, target.clone()));
                }
                let interpolated = interpolate(pattern, &by_name)?;
                let regex = Regex::new(&interpolated)
                    .map_err(|err| TemplateError::BadPattern(line_no, err.to_string()))?;
                rules.push(Rule {
                    regex,
                    action,
                    next_state,
                });
            }
            compiled_states.push((name, rules));
        }

        if compiled_states.iter().all(|(_, rules)| rules.is_empty()) {
            return Err(TemplateError::Empty);
        }
        Ok(Self {
            values,
            states: compiled_states,
        })
    }

    /// Returns the declared field names in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.values.iter().map(|v| v.name.clone()).collect()
    }

    /// Runs the template over a transcript, producing extracted records.
    #[must_use]
    pub fn run(&self, transcript: &str) -> Vec<Record> {
        let mut machine = Machine::new(self);
        for line in transcript.lines() {
            machine.feed(line);
        }
        machine.finish()
    }
}

// ============================================================================
// SECTION: Execution Machine
// ============================================================================

/// Line-by-line execution state for one transcript.
struct Machine<'t> {
    /// Owning template.
    template: &'t CompiledTemplate,
    /// Index of the current state.
    state_index: usize,
    /// Current row under construction.
    row: BTreeMap<String, FieldValue>,
    /// Filldown memory persisting across records.
    filldown: BTreeMap<String, String>,
    /// Emitted records.
    records: Vec<Record>,
}

impl<'t> Machine<'t> {
    fn new(template: &'t CompiledTemplate) -> Self {
        Self {
            template,
            state_index: 0,
            row: BTreeMap::new(),
            filldown: BTreeMap::new(),
            records: Vec::new(),
        }
    }

    /// Applies the current state's rules to one input line.
    fn feed(&mut self, line: &str) {
        let template = self.template;
        let Some((_, rules)) = template.states.get(self.state_index) else {
            return;
        };
        let mut rule_index = 0;
        while let Some(rule) = rules.get(rule_index) {
            let Some(captures) = rule.regex.captures(line) else {
                rule_index += 1;
                continue;
            };
            for value in &template.values {
                if let Some(captured) = captures.name(&value.name) {
                    self.assign(value, captured.as_str());
                }
            }
            if rule.action == RuleAction::Record {
                self.record();
            }
            if let Some(target) = &rule.next_state
                && let Some(index) = template.states.iter().position(|(name, _)| name == target)
            {
                self.state_index = index;
            }
            if rule.action == RuleAction::Continue {
                rule_index += 1;
                continue;
            }
            break;
        }
    }

    /// Assigns one captured value into the current row.
    fn assign(&mut self, value: &ValueDef, captured: &str) {
        if value.list {
            match self.row.get_mut(&value.name) {
                Some(FieldValue::List(items)) => items.push(captured.to_string()),
                _ => {
                    self.row
                        .insert(value.name.clone(), FieldValue::List(vec![captured.to_string()]));
                }
            }
        } else {
            self.row.insert(value.name.clone(), FieldValue::Single(captured.to_string()));
            if value.filldown {
                self.filldown.insert(value.name.clone(), captured.to_string());
            }
        }
    }

    /// Emits the current row if every `Required` value is populated.
    fn record(&mut self) {
        let template = self.template;
        let satisfied = template
            .values
            .iter()
            .filter(|v| v.required)
            .all(|v| self.row.get(&v.name).is_some_and(|value| !value.is_empty()));
        if satisfied && !self.row.is_empty() {
            let mut complete = Record::new();
            for value in &template.values {
                let field = self.row.remove(&value.name).unwrap_or_else(|| {
                    if value.list {
                        FieldValue::List(Vec::new())
                    } else {
                        FieldValue::Single(String::new())
                    }
                });
                complete.insert(value.name.clone(), field);
            }
            self.records.push(complete);
        }
        self.row.clear();
        for (name, remembered) in &self.filldown {
            self.row.insert(name.clone(), FieldValue::Single(remembered.clone()));
        }
    }

    /// Flushes a trailing row at end of input.
    fn finish(mut self) -> Vec<Record> {
        let template = self.template;
        let has_fresh = template.values.iter().any(|v| {
            !v.filldown && self.row.get(&v.name).is_some_and(|value| !value.is_empty())
        });
        if has_fresh {
            self.record();
        }
        self.records
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ARP_TEMPLATE: &str = "\
Value PROTOCOL (\\S+)
Value Required ADDRESS (\\d+\\.\\d+\\.\\d+\\.\\d+)
Value AGE (\\S+)
Value MAC ([0-9a-f]{4}\\.[0-9a-f]{4}\\.[0-9a-f]{4})
Value INTERFACE (\\S+)

Start
  ^${PROTOCOL}\\s+${ADDRESS}\\s+${AGE}\\s+${MAC}\\s+ARPA\\s+${INTERFACE} -> Record
";

    const ARP_OUTPUT: &str = "\
Protocol  Address          Age (min)  Hardware Addr   Type   Interface
Internet  10.0.0.1                5   0012.7f57.ac01  ARPA   Vlan10
Internet  10.0.0.2                -   0012.7f57.ac02  ARPA   Vlan10
Internet  10.0.0.9               12   0012.7f57.ac09  ARPA   Vlan20
";

    #[test]
    fn arp_template_extracts_rows() {
        let template = CompiledTemplate::compile(ARP_TEMPLATE).expect("compile");
        let records = template.run(ARP_OUTPUT);
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0].get("ADDRESS"),
            Some(&FieldValue::Single("10.0.0.1".to_string()))
        );
        assert_eq!(
            records[2].get("INTERFACE"),
            Some(&FieldValue::Single("Vlan20".to_string()))
        );
    }

    #[test]
    fn records_carry_all_declared_fields() {
        let template = CompiledTemplate::compile(ARP_TEMPLATE).expect("compile");
        let records = template.run(ARP_OUTPUT);
        for record in &records {
            assert_eq!(record.len(), 5);
        }
    }

    #[test]
    fn required_value_suppresses_partial_rows() {
        let template = CompiledTemplate::compile(ARP_TEMPLATE).expect("compile");
        let records = template.run("Internet  not-an-address  5  zz  ARPA  Vlan1\n");
        assert!(records.is_empty());
    }

    #[test]
    fn filldown_persists_across_records() {
        let body = "\
Value Filldown VLAN (\\d+)
Value Required MAC ([0-9a-f]{4}\\.[0-9a-f]{4}\\.[0-9a-f]{4})

Start
  ^vlan\\s+${VLAN}
  ^\\s+${MAC} -> Record
";
        let template = CompiledTemplate::compile(body).expect("compile");
        let records = template.run("vlan 10\n  0012.7f57.ac01\n  0012.7f57.ac02\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("VLAN"), Some(&FieldValue::Single("10".to_string())));
    }

    #[test]
    fn version_style_template_records_at_eof() {
        let body = "\
Value Required VERSION (\\S+)
Value UPTIME (.+)

Start
  ^.*Software.*Version\\s+${VERSION},
  ^.*uptime is\\s+${UPTIME}
";
        let template = CompiledTemplate::compile(body).expect("compile");
        let output = "Cisco IOS Software, Version 15.2(4)E7,\nrouter uptime is 3 weeks\n";
        let records = template.run(output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("VERSION"), Some(&FieldValue::Single("15.2(4)E7".to_string())));
    }

    #[test]
    fn list_values_accumulate() {
        let body = "\
Value Required NAME (\\S+)
Value List MEMBER (\\S+)

Start
  ^group\\s+${NAME}
  ^\\s+member\\s+${MEMBER}
  ^end -> Record
";
        let template = CompiledTemplate::compile(body).expect("compile");
        let records = template.run("group g1\n  member a\n  member b\nend\n");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("MEMBER"),
            Some(&FieldValue::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn unknown_value_reference_fails_compile() {
        let body = "Value A (\\d+)\n\nStart\n  ^${MISSING} -> Record\n";
        assert!(matches!(
            CompiledTemplate::compile(body),
            Err(TemplateError::UnknownValue(_))
        ));
    }

    #[test]
    fn unknown_state_target_fails_compile() {
        let body = "Value A (\\d+)\n\nStart\n  ^${A} -> Record Elsewhere\n";
        assert!(matches!(
            CompiledTemplate::compile(body),
            Err(TemplateError::UnknownState(_, _))
        ));
    }
}
