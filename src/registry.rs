use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{AppError, AppResult};

/// One entry of the paperwork catalog. Loaded once at startup; never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentTypeDefinition {
    pub code: String,
    /// Filename prefix families use when naming their scans.
    pub prefix: String,
    pub display_name: String,
    /// Required when two types share a prefix; the token right after the
    /// prefix tells them apart.
    pub disambiguation_token: Option<String>,
    pub mandatory: bool,
    /// Minimum participant age in completed years, if the document only
    /// applies from a certain age.
    pub min_age: Option<i32>,
    pub has_template: bool,
}

impl DocumentTypeDefinition {
    pub fn applies_to_age(&self, age_years: i32) -> bool {
        self.min_age.map_or(true, |min| age_years >= min)
    }
}

/// Static catalog of document types, indexed by code and validated at load
/// time: shared prefixes are only legal when every sharer carries a distinct
/// disambiguation token.
#[derive(Debug, Clone)]
pub struct DocumentTypeRegistry {
    definitions: Vec<DocumentTypeDefinition>,
    by_code: HashMap<String, usize>,
    shared_prefixes: HashSet<String>,
}

impl DocumentTypeRegistry {
    pub fn new(definitions: Vec<DocumentTypeDefinition>) -> AppResult<Self> {
        let mut by_code = HashMap::new();
        let mut by_prefix: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, definition) in definitions.iter().enumerate() {
            if by_code
                .insert(definition.code.clone(), index)
                .is_some()
            {
                return Err(AppError::configuration(format!(
                    "duplicate document type code '{}'",
                    definition.code
                )));
            }
            by_prefix
                .entry(definition.prefix.to_lowercase())
                .or_default()
                .push(index);
        }

        let mut shared_prefixes = HashSet::new();
        for (prefix, indexes) in &by_prefix {
            if indexes.len() < 2 {
                continue;
            }
            let mut tokens = HashSet::new();
            for &index in indexes {
                let definition = &definitions[index];
                let token = definition.disambiguation_token.as_ref().ok_or_else(|| {
                    AppError::configuration(format!(
                        "document type '{}' shares prefix '{}' but has no disambiguation token",
                        definition.code, definition.prefix
                    ))
                })?;
                if !tokens.insert(token.to_lowercase()) {
                    return Err(AppError::configuration(format!(
                        "duplicate disambiguation token '{}' under prefix '{}'",
                        token, definition.prefix
                    )));
                }
            }
            shared_prefixes.insert(prefix.clone());
        }

        Ok(Self {
            definitions,
            by_code,
            shared_prefixes,
        })
    }

    /// The organization's paperwork set.
    pub fn builtin() -> Self {
        let definitions = vec![
            def("ficha_inscripcion", "DOC01", "Ficha de inscripción", None, true, None, true),
            def("autorizacion_imagen", "DOC02", "Autorización de imagen", None, true, None, true),
            def("ficha_medica", "DOC03", "Ficha médica", None, true, None, true),
            def("tarjeta_sip", "A02", "Tarjeta SIP", Some("SIP"), true, None, false),
            def("cartilla_vacunas", "A02", "Cartilla de vacunación", Some("Vacunas"), true, None, false),
            def("autorizacion_actividades", "DOC05", "Autorización de actividades", None, false, None, true),
            def("dni", "DOC06", "DNI", None, false, Some(14), false),
        ];
        // The built-in catalog is checked by unit tests; construction cannot fail.
        Self::new(definitions).unwrap_or_else(|err| panic!("built-in catalog invalid: {err}"))
    }

    pub fn get(&self, code: &str) -> AppResult<&DocumentTypeDefinition> {
        self.by_code
            .get(code)
            .map(|&index| &self.definitions[index])
            .ok_or_else(|| AppError::configuration(format!("unknown document type '{code}'")))
    }

    /// Definitions applicable to a participant of the given age, in catalog
    /// order.
    pub fn applicable(&self, age_years: i32) -> Vec<&DocumentTypeDefinition> {
        self.definitions
            .iter()
            .filter(|definition| definition.applies_to_age(age_years))
            .collect()
    }

    /// Whether more than one type claims this prefix. Shared prefixes forbid
    /// the legacy filename fallback.
    pub fn is_prefix_shared(&self, prefix: &str) -> bool {
        self.shared_prefixes.contains(&prefix.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentTypeDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn def(
    code: &str,
    prefix: &str,
    display_name: &str,
    disambiguation_token: Option<&str>,
    mandatory: bool,
    min_age: Option<i32>,
    has_template: bool,
) -> DocumentTypeDefinition {
    DocumentTypeDefinition {
        code: code.to_string(),
        prefix: prefix.to_string(),
        display_name: display_name.to_string(),
        disambiguation_token: disambiguation_token.map(str::to_string),
        mandatory,
        min_age,
        has_template,
    }
}
