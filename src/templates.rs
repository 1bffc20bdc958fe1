// src/templates.rs

use crate::dataset::TabularDataset;
use crate::error::{LabelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A saved column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub columns: Vec<String>,
}

/// How well a template lines up with a file's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFit {
    Full { total: usize },
    Partial { matching: usize, total: usize },
    None { total: usize },
}

impl TemplateFit {
    pub fn of(template: &Template, columns: &[String]) -> Self {
        let total = template.columns.len();
        let matching = template
            .columns
            .iter()
            .filter(|c| columns.contains(c))
            .count();
        match matching {
            0 => TemplateFit::None { total },
            m if m == total => TemplateFit::Full { total },
            m => TemplateFit::Partial { matching: m, total },
        }
    }
}

impl std::fmt::Display for TemplateFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateFit::Full { total } => write!(f, "all {total} columns match"),
            TemplateFit::Partial { matching, total } => {
                write!(f, "{matching}/{total} columns match")
            }
            TemplateFit::None { total } => write!(f, "0/{total} columns match"),
        }
    }
}

/// Named templates for one tool, kept in a single JSON file.
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl AsRef<Path>, tool: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", safe_file_stem(tool))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All templates; a missing file is an empty store.
    pub fn load(&self) -> Result<BTreeMap<String, Template>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, templates: &BTreeMap<String, Template>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(templates)?)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Template> {
        self.load()?
            .remove(name)
            .ok_or_else(|| LabelError::TemplateNotFound(name.to_string()))
    }

    /// Add a new template; an existing name is an error.
    pub fn create(&self, name: &str, columns: Vec<String>) -> Result<()> {
        let mut templates = self.load()?;
        if templates.contains_key(name) {
            return Err(LabelError::TemplateExists(name.to_string()));
        }
        templates.insert(name.to_string(), Template { columns });
        self.save(&templates)?;
        info!(template = %name, path = %self.path.display(), "Template saved");
        Ok(())
    }

    /// Replace a template's columns, optionally renaming it.
    pub fn update(&self, name: &str, rename: Option<&str>, columns: Vec<String>) -> Result<()> {
        let mut templates = self.load()?;
        if !templates.contains_key(name) {
            return Err(LabelError::TemplateNotFound(name.to_string()));
        }
        let target = rename.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(name);
        if target != name && templates.contains_key(target) {
            return Err(LabelError::TemplateExists(target.to_string()));
        }
        templates.remove(name);
        templates.insert(target.to_string(), Template { columns });
        self.save(&templates)?;
        info!(template = %target, previous = %name, "Template updated");
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let mut templates = self.load()?;
        if templates.remove(name).is_none() {
            return Err(LabelError::TemplateNotFound(name.to_string()));
        }
        self.save(&templates)?;
        info!(template = %name, "Template deleted");
        Ok(())
    }
}

/// File-system friendly stem: alphanumerics, space, '-' and '_' survive,
/// spaces become '_', everything is lower-cased.
pub fn safe_file_stem(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let stem = kept.trim().replace(' ', "_").to_lowercase();
    if stem.is_empty() {
        "default".to_string()
    } else {
        stem
    }
}

/// Keep the listed columns that exist in `dataset`, in the listed order.
/// Names the file does not have are dropped with a warning.
pub fn project(dataset: &TabularDataset, columns: &[String]) -> Result<TabularDataset> {
    let (present, missing): (Vec<String>, Vec<String>) = columns
        .iter()
        .cloned()
        .partition(|c| dataset.columns().contains(c));
    if !missing.is_empty() {
        warn!(missing = ?missing, "Template columns not found in this file");
    }
    if present.is_empty() {
        return Ok(dataset.clone());
    }
    dataset.select_columns(&present)
}

/// Kitchen order lists: keep rows whose "type" column holds one of `types`.
/// Without a "type" column the dataset is returned unchanged.
pub fn filter_by_type(dataset: &TabularDataset, types: &[String]) -> TabularDataset {
    let Some(idx) = dataset
        .columns()
        .iter()
        .position(|c| c.eq_ignore_ascii_case("type"))
    else {
        warn!("No 'type' column, type filter ignored");
        return dataset.clone();
    };
    dataset.filter_rows(|row| {
        let value = row[idx].to_string();
        types.iter().any(|t| *t == value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::text_table;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_safe_file_stem() {
        assert_eq!(safe_file_stem("Driver Run Sheet Processor"), "driver_run_sheet_processor");
        assert_eq!(safe_file_stem("  Kitchen/Orders!  "), "kitchenorders");
        assert_eq!(safe_file_stem("%%%"), "default");
    }

    #[test]
    fn test_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path(), "Driver Run Sheet Processor");
        assert!(store.load().unwrap().is_empty());

        store
            .create("Morning", vec!["Stop".into(), "Order".into()])
            .unwrap();
        assert!(matches!(
            store.create("Morning", vec![]),
            Err(LabelError::TemplateExists(_))
        ));

        store
            .update("Morning", Some("AM"), vec!["Order".into()])
            .unwrap();
        let templates = store.load().unwrap();
        assert_eq!(templates.keys().collect::<Vec<_>>(), vec!["AM"]);
        assert_eq!(templates["AM"].columns, vec!["Order"]);

        store.delete("AM").unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(matches!(store.delete("AM"), Err(LabelError::TemplateNotFound(_))));
        assert!(store.path().ends_with("driver_run_sheet_processor.json"));
    }

    #[test]
    fn test_rename_onto_existing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::new(dir.path(), "kitchen");
        store.create("A", vec!["x".into()]).unwrap();
        store.create("B", vec!["y".into()]).unwrap();
        assert!(matches!(
            store.update("A", Some("B"), vec![]),
            Err(LabelError::TemplateExists(_))
        ));
    }

    #[test]
    fn test_fit() {
        let columns: Vec<String> = vec!["Stop".into(), "Order".into()];
        let fit = |cols: &[&str]| {
            TemplateFit::of(
                &Template {
                    columns: cols.iter().map(|c| c.to_string()).collect(),
                },
                &columns,
            )
        };
        assert_eq!(fit(&["Order", "Stop"]), TemplateFit::Full { total: 2 });
        assert_eq!(
            fit(&["Order", "Phone"]),
            TemplateFit::Partial {
                matching: 1,
                total: 2
            }
        );
        assert_eq!(fit(&["Phone"]), TemplateFit::None { total: 1 });
    }

    #[test]
    fn test_project_and_type_filter() {
        let table = text_table(
            &["Item", "Type", "Qty"],
            &[&["Soup", "Hot", "2"], &["Salad", "Cold", "1"], &["Stew", "Hot", "4"]],
        );
        let projected = project(&table, &["Qty".into(), "Gone".into(), "Item".into()]).unwrap();
        assert_eq!(projected.columns(), ["Qty", "Item"]);

        let hot = filter_by_type(&table, &["Hot".into()]);
        assert_eq!(hot.len(), 2);
        let untouched = filter_by_type(&projected, &["Hot".into()]);
        assert_eq!(untouched.len(), 3);
    }
}
