//! String transformations used to map between file names, component keys and constant names.

use convert_case::{Case, Casing};
use fxhash::FxHashSet;

/// Separator between segments of a constant name, e.g. `Search::IndexEntity`.
pub const CONSTANT_SEPARATOR: &str = "::";

const PATH_SEPARATOR: char = '.';

/// Converts names between `snake_case` and `PascalCase`, preserving configured acronyms.
#[derive(Clone, Debug, Default)]
pub struct Inflector {
    acronyms: FxHashSet<String>,
}

impl Inflector {
    /// Adds an acronym kept upper-cased when camelizing, e.g. `API` for `api_client` ->
    /// `APIClient`.
    pub fn with_acronym<T: AsRef<str>>(mut self, acronym: T) -> Self {
        self.acronyms.insert(acronym.as_ref().to_uppercase());
        self
    }

    /// `IndexEntity` -> `index_entity`
    pub fn underscore(&self, value: &str) -> String {
        value.to_case(Case::Snake)
    }

    /// `index_entity` -> `IndexEntity`
    pub fn camelize(&self, value: &str) -> String {
        self.underscore(value)
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let upper = word.to_uppercase();
                if self.acronyms.contains(&upper) {
                    upper
                } else {
                    word.to_case(Case::Pascal)
                }
            })
            .collect()
    }

    /// `search.index_entity` -> `Search::IndexEntity`
    pub fn classify_path(&self, path: &str) -> String {
        path.split(PATH_SEPARATOR)
            .map(|segment| self.camelize(segment))
            .collect::<Vec<_>>()
            .join(CONSTANT_SEPARATOR)
    }

    /// `Search::IndexEntity` -> `search.index_entity`
    pub fn underscore_path(&self, constant: &str) -> String {
        constant
            .split(CONSTANT_SEPARATOR)
            .map(|segment| self.underscore(segment))
            .collect::<Vec<_>>()
            .join(".")
    }
}
