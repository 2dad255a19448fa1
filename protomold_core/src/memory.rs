use crate::bits::Bits;
use crate::variable::VariableId;
use std::collections::HashMap;

/// Session-scoped store of previously observed or generated field values.
///
/// A memory belongs to exactly one execution context (one parsing or one
/// specializing session). The engines never write into it while a walk is
/// running: learned values are staged on the candidate path and committed
/// here only when the walk succeeds, so a failed attempt leaves the memory
/// untouched. Callers running several sessions concurrently must give each
/// session its own memory.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    values: HashMap<VariableId, Bits>,
}

impl Memory {
    /// Creates an empty memory.
    #[must_use]
    pub fn new() -> Self {
        Memory::default()
    }

    /// Stores a value for the variable, replacing any previous one.
    pub fn memorize(&mut self, variable: VariableId, value: Bits) {
        self.values.insert(variable, value);
    }

    /// Returns true if a value is stored for the variable.
    #[must_use]
    pub fn has_value(&self, variable: VariableId) -> bool {
        self.values.contains_key(&variable)
    }

    /// Returns the stored value of the variable.
    #[must_use]
    pub fn value(&self, variable: VariableId) -> Option<&Bits> {
        self.values.get(&variable)
    }

    /// Drops the stored value of the variable.
    pub fn forget(&mut self, variable: VariableId) {
        self.values.remove(&variable);
    }

    /// Drops every stored value.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Applies the staged writes of a successful walk.
    pub(crate) fn commit(&mut self, delta: &HashMap<VariableId, Bits>) {
        for (variable, value) in delta {
            tracing::trace!("memory commit for variable {variable:?}: {value}");
            self.values.insert(*variable, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use crate::variable::Variable;

    #[test]
    fn memorize_and_forget() {
        let var = Variable::data("var1", DataType::string_interval(0, 8));
        let mut memory = Memory::new();
        assert!(!memory.has_value(var.id()));
        memory.memorize(var.id(), Bits::from_text("kurt"));
        assert_eq!(memory.value(var.id()), Some(&Bits::from_text("kurt")));
        memory.forget(var.id());
        assert!(memory.is_empty());
    }
}
