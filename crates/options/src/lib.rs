//! UCI option handling: parsing `option name ... type ...` declaration
//! lines, holding typed current/default values, and the per-engine registry.
//!
//! An engine announces its options during startup; the GUI records them
//! here, updates them via [`UciOption::set_from_string`], and reads them
//! back with [`UciOption::string_value`]. Names preserve the engine's
//! original casing but compare case-insensitively everywhere.

use std::collections::HashMap;
use tracing::debug;

/// Typed payload of a UCI option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Check {
        value: bool,
        default: bool,
    },
    Spin {
        value: i64,
        default: i64,
        min: i64,
        max: i64,
    },
    Combo {
        value: String,
        default: String,
        allowed: Vec<String>,
    },
    /// Valueless action trigger (`Clear Hash` and friends).
    Button,
    String {
        value: String,
        default: String,
    },
}

/// A single engine option: name, visibility, and typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciOption {
    /// Name exactly as declared by the engine.
    pub name: String,
    /// False for options the host manages itself (see [`is_editable`]).
    pub visible: bool,
    value: OptionValue,
    modified: bool,
}

impl UciOption {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            visible: true,
            value,
            modified: false,
        }
    }

    pub fn value(&self) -> &OptionValue {
        &self.value
    }

    /// True once an update has left the current value different from the
    /// default.
    pub fn modified(&self) -> bool {
        self.modified
    }

    /// Current value rendered as UCI text. Buttons render empty.
    pub fn string_value(&self) -> String {
        match &self.value {
            OptionValue::Check { value, .. } => value.to_string(),
            OptionValue::Spin { value, .. } => value.to_string(),
            OptionValue::Combo { value, .. } => value.clone(),
            OptionValue::Button => String::new(),
            OptionValue::String { value, .. } => value.clone(),
        }
    }

    /// Coerce `text` into this option's type and store it.
    ///
    /// Returns true when the value was accepted and actually changed.
    /// Rejected updates (unparsable text, spin out of range, combo value
    /// not in the allowed set) leave value and modified flag untouched, as
    /// does assigning the value already held.
    pub fn set_from_string(&mut self, text: &str) -> bool {
        match &mut self.value {
            OptionValue::Check { value, default } => {
                let new = match text {
                    "true" => true,
                    "false" => false,
                    _ => return false,
                };
                if *value == new {
                    return false;
                }
                *value = new;
                self.modified = new != *default;
                true
            }
            OptionValue::Spin {
                value,
                default,
                min,
                max,
            } => {
                let Ok(new) = text.parse::<i64>() else {
                    return false;
                };
                if new < *min || new > *max || *value == new {
                    return false;
                }
                *value = new;
                self.modified = new != *default;
                true
            }
            OptionValue::Combo {
                value,
                default,
                allowed,
            } => {
                // Store the canonical (declared-case) spelling.
                let Some(canonical) = allowed
                    .iter()
                    .find(|a| a.eq_ignore_ascii_case(text))
                    .cloned()
                else {
                    return false;
                };
                if *value == canonical {
                    return false;
                }
                self.modified = canonical != *default;
                *value = canonical;
                true
            }
            OptionValue::Button => false,
            OptionValue::String { value, default } => {
                if *value == text {
                    return false;
                }
                *value = text.to_string();
                self.modified = text != *default;
                true
            }
        }
    }
}

/// Recognized keywords inside a declaration line.
fn is_keyword(token: &str) -> bool {
    matches!(token, "name" | "type" | "default" | "min" | "max" | "var")
}

/// Parse one `option name <name> type <type> ...` declaration line.
///
/// The name runs from the `name` keyword to the `type` keyword and may
/// contain spaces. Combo defaults and `var` entries may also be
/// multi-token; string defaults consume the rest of the line. Malformed
/// input yields `None`, never a partially built option.
pub fn parse_declaration(line: &str) -> Option<UciOption> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 || tokens[0] != "option" || tokens[1] != "name" {
        return None;
    }
    let type_pos = tokens.iter().position(|t| *t == "type")?;
    if type_pos <= 2 || type_pos + 1 >= tokens.len() {
        return None;
    }
    let name = tokens[2..type_pos].join(" ");
    let kind = tokens[type_pos + 1];
    let rest = &tokens[type_pos + 2..];

    let value = match kind {
        "check" => {
            let default = match single_value(rest, "default")?.as_str() {
                "true" => true,
                "false" => false,
                _ => return None,
            };
            OptionValue::Check {
                value: default,
                default,
            }
        }
        "spin" => {
            let default = single_value(rest, "default")?.parse().ok()?;
            let min = single_value(rest, "min")?.parse().ok()?;
            let max = single_value(rest, "max")?.parse().ok()?;
            if min > max {
                return None;
            }
            OptionValue::Spin {
                value: default,
                default,
                min,
                max,
            }
        }
        "combo" => {
            let default = multi_token_value(rest, "default")?;
            let allowed = var_values(rest);
            if allowed.is_empty() {
                return None;
            }
            OptionValue::Combo {
                value: default.clone(),
                default,
                allowed,
            }
        }
        "button" => OptionValue::Button,
        "string" => {
            // The default is everything after the keyword; engines use the
            // literal `<empty>` placeholder for an empty path.
            let pos = rest.iter().position(|t| *t == "default")?;
            let default = rest[pos + 1..].join(" ");
            OptionValue::String {
                value: default.clone(),
                default,
            }
        }
        _ => {
            debug!("unrecognized option type {kind:?} in {line:?}");
            return None;
        }
    };

    Some(UciOption::new(name, value))
}

/// Single-token value following `keyword`.
fn single_value(tokens: &[&str], keyword: &str) -> Option<String> {
    let pos = tokens.iter().position(|t| *t == keyword)?;
    tokens.get(pos + 1).map(|t| t.to_string())
}

/// Multi-token value following `keyword`, up to the next keyword.
fn multi_token_value(tokens: &[&str], keyword: &str) -> Option<String> {
    let pos = tokens.iter().position(|t| *t == keyword)?;
    let tail = &tokens[pos + 1..];
    let end = tail
        .iter()
        .position(|t| is_keyword(t))
        .unwrap_or(tail.len());
    if end == 0 {
        return None;
    }
    Some(tail[..end].join(" "))
}

/// Every `var` value in declaration order, multi-token values included.
fn var_values(tokens: &[&str]) -> Vec<String> {
    let mut values = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i] == "var" {
            let tail = &tokens[i + 1..];
            let end = tail
                .iter()
                .position(|t| is_keyword(t))
                .unwrap_or(tail.len());
            if end > 0 {
                values.push(tail[..end].join(" "));
            }
            i += 1 + end;
        } else {
            i += 1;
        }
    }
    values
}

/// Option names the host configures on the user's behalf; they are hidden
/// from the user-editable set, as is anything in the reserved `UCI_`
/// namespace.
const HOST_MANAGED: &[&str] = &[
    "hash",
    "ponder",
    "multipv",
    "uci_chess960",
    "uci_limitstrength",
    "uci_elo",
    "ownbook",
    "syzygypath",
    "gaviotatbpath",
];

/// Whether an option with this name should be user-editable.
pub fn is_editable(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !lower.starts_with("uci_") && !HOST_MANAGED.contains(&lower.as_str())
}

/// Insertion-ordered, case-insensitive mapping from option name to option.
#[derive(Debug, Clone, Default)]
pub struct OptionsRegistry {
    order: Vec<String>,
    by_name: HashMap<String, UciOption>,
}

impl OptionsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an option. Re-declaring a name replaces the stored option
    /// but keeps its original position.
    pub fn insert(&mut self, option: UciOption) {
        let key = option.name.to_ascii_lowercase();
        if self.by_name.insert(key.clone(), option).is_none() {
            self.order.push(key);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&UciOption> {
        self.by_name.get(&name.to_ascii_lowercase())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut UciOption> {
        self.by_name.get_mut(&name.to_ascii_lowercase())
    }

    /// Lower-cased names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &UciOption> {
        self.order.iter().filter_map(|k| self.by_name.get(k))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_name.clear();
    }
}
