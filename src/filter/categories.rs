//! Category table: logical log categories to backend log identifiers

use std::collections::BTreeMap;

/// Placeholder substituted with the resource scope (project id)
pub const SCOPE_PLACEHOLDER: &str = "{scope}";

pub const AUDIT_TABLE: &str = "gcp_audit_log";
pub const REQUESTS_TABLE: &str = "gcp_requests_log";

/// Static category→identifier mapping, grouped by table
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    tables: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the audit and request log categories
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for category in ["activity", "data_access", "system_event", "policy"] {
            table.register(
                AUDIT_TABLE,
                category,
                [format!("projects/{SCOPE_PLACEHOLDER}/logs/cloudaudit.googleapis.com%2F{category}")],
            );
        }
        table.register(
            REQUESTS_TABLE,
            "requests",
            [format!("projects/{SCOPE_PLACEHOLDER}/logs/requests")],
        );
        table
    }

    /// Add identifier templates for a category, extending any already present
    pub fn register<I, S>(&mut self, table: &str, category: &str, templates: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .tables
            .entry(table.to_string())
            .or_default()
            .entry(category.to_string())
            .or_default();
        for template in templates {
            let template = template.into();
            if !entry.contains(&template) {
                entry.push(template);
            }
        }
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Category names known for `table`; every table's when it is unknown
    pub fn known_categories(&self, table: &str) -> Vec<&str> {
        let mut categories: Vec<&str> = self
            .known(table)
            .into_iter()
            .map(|(category, _)| category)
            .collect();
        categories.sort_unstable();
        categories.dedup();
        categories
    }

    /// Resolve selected categories into concrete identifiers.
    ///
    /// Unknown names are ignored. An empty selection, or one where nothing
    /// resolves, yields every known identifier.
    pub fn resolve(&self, table: &str, selected: &[String], scope: &str) -> Vec<String> {
        let known = self.known(table);

        let mut templates: Vec<&str> = Vec::new();
        for category in selected {
            let category = category.trim();
            for (name, entries) in &known {
                if *name == category {
                    templates.extend(entries.iter().map(String::as_str));
                }
            }
        }

        if templates.is_empty() {
            templates = known
                .iter()
                .flat_map(|(_, entries)| entries.iter().map(String::as_str))
                .collect();
        }

        let mut resolved: Vec<String> = Vec::with_capacity(templates.len());
        for template in templates {
            let identifier = template.replace(SCOPE_PLACEHOLDER, scope);
            if !resolved.contains(&identifier) {
                resolved.push(identifier);
            }
        }
        resolved
    }

    fn known(&self, table: &str) -> Vec<(&str, &Vec<String>)> {
        match self.tables.get(table) {
            Some(categories) => categories
                .iter()
                .map(|(name, entries)| (name.as_str(), entries))
                .collect(),
            None => self
                .tables
                .values()
                .flat_map(|categories| categories.iter())
                .map(|(name, entries)| (name.as_str(), entries))
                .collect(),
        }
    }
}
