//! Style sheet registry
//!
//! Style sheet contents are registered by path, then appended (optionally
//! bound to a style scope) and may later be disabled.

use std::collections::HashMap;

use crate::BackendError;

/// Style scope identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleScope(pub u32);

/// Appended style sheet identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleSheetId(pub u32);

#[derive(Debug, Clone)]
struct AppendedSheet {
    path: String,
    scope: Option<StyleScope>,
    disabled: bool,
}

/// Registry of style sheet contents, scopes and appended sheets
#[derive(Debug, Default)]
pub struct StyleSheetRegistry {
    contents: HashMap<String, String>,
    scopes: Vec<String>,
    sheets: Vec<AppendedSheet>,
}

impl StyleSheetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the content of a style sheet path
    pub fn register_content(&mut self, path: &str, content: &str) {
        self.contents.insert(path.to_string(), content.to_string());
    }

    /// Register a style scope name, returning its id
    pub fn register_scope(&mut self, name: &str) -> StyleScope {
        if let Some(pos) = self.scopes.iter().position(|s| s == name) {
            return StyleScope(pos as u32);
        }
        self.scopes.push(name.to_string());
        StyleScope(self.scopes.len() as u32 - 1)
    }

    /// Name of a registered scope
    pub fn scope_name(&self, scope: StyleScope) -> Option<&str> {
        self.scopes.get(scope.0 as usize).map(String::as_str)
    }

    /// Append a registered sheet
    pub fn append(
        &mut self,
        path: &str,
        scope: Option<StyleScope>,
    ) -> Result<StyleSheetId, BackendError> {
        if !self.contents.contains_key(path) {
            return Err(BackendError::UnknownStyleSheet(path.to_string()));
        }
        if let Some(scope) = scope {
            if self.scope_name(scope).is_none() {
                return Err(BackendError::UnknownStyleScope(scope));
            }
        }
        self.sheets.push(AppendedSheet {
            path: path.to_string(),
            scope,
            disabled: false,
        });
        tracing::trace!("Appended style sheet {} (scope {:?})", path, scope);
        Ok(StyleSheetId(self.sheets.len() as u32 - 1))
    }

    /// Disable an appended sheet
    pub fn disable(&mut self, id: StyleSheetId) -> Result<(), BackendError> {
        let sheet = self
            .sheets
            .get_mut(id.0 as usize)
            .ok_or_else(|| BackendError::UnknownStyleSheet(format!("#{}", id.0)))?;
        sheet.disabled = true;
        Ok(())
    }

    /// Paths of appended sheets that are still enabled, in append order
    pub fn active_paths(&self) -> Vec<&str> {
        self.sheets
            .iter()
            .filter(|s| !s.disabled)
            .map(|s| s.path.as_str())
            .collect()
    }

    /// Content of an enabled sheet together with its scope
    pub fn active_sheet(&self, id: StyleSheetId) -> Option<(&str, Option<StyleScope>)> {
        let sheet = self.sheets.get(id.0 as usize).filter(|s| !s.disabled)?;
        let content = self.contents.get(&sheet.path)?;
        Some((content.as_str(), sheet.scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_requires_registered_content() {
        let mut registry = StyleSheetRegistry::new();
        assert_eq!(
            registry.append("app.css", None),
            Err(BackendError::UnknownStyleSheet("app.css".into()))
        );

        registry.register_content("app.css", ".a { color: red }");
        let id = registry.append("app.css", None).unwrap();
        assert_eq!(registry.active_sheet(id), Some((".a { color: red }", None)));
    }

    #[test]
    fn test_unknown_scope() {
        let mut registry = StyleSheetRegistry::new();
        registry.register_content("comp.css", "");
        assert_eq!(
            registry.append("comp.css", Some(StyleScope(3))),
            Err(BackendError::UnknownStyleScope(StyleScope(3)))
        );

        let scope = registry.register_scope("comp");
        assert_eq!(registry.register_scope("comp"), scope);
        assert!(registry.append("comp.css", Some(scope)).is_ok());
    }

    #[test]
    fn test_disable() {
        let mut registry = StyleSheetRegistry::new();
        registry.register_content("a.css", "a");
        registry.register_content("b.css", "b");
        let a = registry.append("a.css", None).unwrap();
        registry.append("b.css", None).unwrap();

        registry.disable(a).unwrap();
        assert_eq!(registry.active_paths(), vec!["b.css"]);
        assert!(registry.active_sheet(a).is_none());
        assert!(registry.disable(StyleSheetId(9)).is_err());
    }
}
