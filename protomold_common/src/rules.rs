use protomold_core::bits::Bits;
use protomold_core::error::{ProtomoldError, ProtomoldResult};
use protomold_core::preset::Preset;
use protomold_core::variable::Format;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One declarative preset rule: the named field is pinned to a fixed
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetRule {
    /// Display name of the targeted field.
    pub field: String,
    /// The pinned value.
    pub value: RuleValue,
}

/// The value forms a rule file can express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleValue {
    /// Text content, one byte per character.
    Text(String),
    /// Hexadecimal byte content.
    Hex(String),
    /// An unsigned integer on an explicit bit width.
    Uint {
        /// The value.
        value: u64,
        /// Storage width in bits.
        bits: u32,
    },
}

impl RuleValue {
    fn to_bits(&self) -> ProtomoldResult<Bits> {
        match self {
            RuleValue::Text(text) => Ok(Bits::from_text(text)),
            RuleValue::Hex(digits) => {
                let bytes = hex::decode(digits).map_err(|err| ProtomoldError::Rules {
                    reason: format!("invalid hex value '{digits}': {err}"),
                })?;
                Ok(Bits::from_bytes(&bytes))
            }
            RuleValue::Uint { value, bits } => {
                if *bits > 64 {
                    return Err(ProtomoldError::Rules {
                        reason: format!("unsigned rule values hold at most 64 bits, got {bits}"),
                    });
                }
                Ok(Bits::from_uint(*value, *bits as usize))
            }
        }
    }
}

/// Loads preset rules from a JSON file.
///
/// # Errors
/// I/O failures and malformed rule files.
pub fn load_rules(path: &Path) -> ProtomoldResult<Vec<PresetRule>> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|err| ProtomoldError::Rules {
        reason: format!("{}: {err}", path.display()),
    })
}

/// Applies rules to a preset by resolving field names against a format.
/// Each matched field is bound to its fixed value.
///
/// # Errors
/// Unknown field names and unrepresentable values.
pub fn apply_rules(
    preset: &mut Preset,
    format: &Format,
    rules: &[PresetRule],
) -> ProtomoldResult<()> {
    for rule in rules {
        let Some(var) = format.field_named(&rule.field) else {
            return Err(ProtomoldError::Rules {
                reason: format!(
                    "format '{}' has no field named '{}'",
                    format.name(),
                    rule.field
                ),
            });
        };
        preset.fix(var, rule.value.to_bits()?);
        tracing::debug!("pinned field '{}' from a preset rule", rule.field);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::greeting;
    use protomold_core::memory::Memory;
    use protomold_core::specializer::specialize;

    #[test]
    fn rules_round_trip_through_json() {
        let rules = vec![
            PresetRule {
                field: "name".into(),
                value: RuleValue::Text("hello".into()),
            },
            PresetRule {
                field: "sport".into(),
                value: RuleValue::Uint { value: 53, bits: 16 },
            },
        ];
        let json = serde_json::to_string(&rules).expect("serializes");
        let back: Vec<PresetRule> = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(rules, back);
    }

    #[test]
    fn applied_rules_pin_the_specialized_value() {
        let format = greeting();
        let rules = vec![PresetRule {
            field: "name".into(),
            value: RuleValue::Text("karol".into()),
        }];
        let mut preset = Preset::new();
        apply_rules(&mut preset, &format, &rules).expect("applies");

        let mut memory = Memory::new();
        let wire = specialize(&format, &mut memory, &mut preset).expect("specializes");
        let text = wire.to_text().expect("text");
        assert!(text.starts_with("karol "));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let format = greeting();
        let rules = vec![PresetRule {
            field: "missing".into(),
            value: RuleValue::Hex("ff".into()),
        }];
        let mut preset = Preset::new();
        assert!(apply_rules(&mut preset, &format, &rules).is_err());
    }
}
