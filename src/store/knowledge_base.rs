use super::{read_json_or_default, write_json};
use crate::error::HarnessError;
use crate::utils::safe_file_name;
use anyhow::{Context, Result};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `kb.json`: learned object name → template image path
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    path: PathBuf,
    images_dir: PathBuf,
}

impl KnowledgeBase {
    pub fn new(path: impl Into<PathBuf>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            images_dir: images_dir.into(),
        }
    }

    pub fn load(&self) -> Result<BTreeMap<String, PathBuf>> {
        read_json_or_default(&self.path)
    }

    /// Template image for a learned object name
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.load()?.remove(name).ok_or_else(|| {
            HarnessError::InvalidInput(format!(
                "Object '{}' is not in the knowledge base. Teach it with `learn` first.",
                name
            ))
            .into()
        })
    }

    /// `images/<lower_snake_name>.png`
    pub fn image_path_for(&self, name: &str) -> PathBuf {
        let file = safe_file_name(&name.trim().to_lowercase().replace(' ', "_"));
        self.images_dir.join(format!("{}.png", file))
    }

    /// Save a template image and register it under `name`.
    ///
    /// An existing name is only replaced when `overwrite` is set.
    pub fn learn(&self, name: &str, image: &DynamicImage, overwrite: bool) -> Result<PathBuf> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HarnessError::InvalidInput("object name is empty".into()).into());
        }

        let mut entries = self.load()?;
        let image_path = self.image_path_for(name);
        if !overwrite {
            if entries.contains_key(name) {
                return Err(HarnessError::InvalidInput(format!(
                    "Object '{}' already exists. Use --force to overwrite it.",
                    name
                ))
                .into());
            }
            // "Save" and "save" share images/save.png
            if let Some((owner, _)) = entries.iter().find(|(_, path)| **path == image_path) {
                return Err(HarnessError::InvalidInput(format!(
                    "Object '{}' already uses {}. Use --force to overwrite it.",
                    owner,
                    image_path.display()
                ))
                .into());
            }
        }

        std::fs::create_dir_all(&self.images_dir)
            .map_err(|e| HarnessError::persistence(&self.images_dir, e))?;
        image
            .save(&image_path)
            .with_context(|| format!("Failed to save {}", image_path.display()))?;

        entries.insert(name.to_string(), image_path.clone());
        write_json(&self.path, &entries)?;
        log::info!("SUCCESS: knowledge base updated for '{}'", name);
        Ok(image_path)
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb(root: &Path) -> KnowledgeBase {
        KnowledgeBase::new(root.join("kb.json"), root.join("images"))
    }

    #[test]
    fn test_learn_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let kb = kb(dir.path());
        let image = DynamicImage::new_rgb8(3, 2);

        let path = kb.learn("Trash Can", &image, false).unwrap();
        assert_eq!(path, dir.path().join("images").join("trash_can.png"));
        assert!(path.is_file());
        assert_eq!(kb.resolve("Trash Can").unwrap(), path);
        assert!(kb.resolve("trash can").is_err());
    }

    #[test]
    fn test_overwrite_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let kb = kb(dir.path());
        let image = DynamicImage::new_rgb8(3, 2);

        kb.learn("ok", &image, false).unwrap();
        assert!(kb.learn("ok", &image, false).is_err());
        assert!(kb.learn("ok", &image, true).is_ok());
    }

    #[test]
    fn test_names_sharing_an_image_file_need_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let kb = kb(dir.path());
        let original = DynamicImage::new_rgb8(3, 2);

        let path = kb.learn("Save", &original, false).unwrap();
        let err = kb
            .learn("save", &DynamicImage::new_rgb8(5, 5), false)
            .unwrap_err();
        assert!(err.to_string().contains("'Save' already uses"));
        assert!(kb.learn("ok button", &original, false).is_ok());
        assert!(kb.learn("ok_button", &original, false).is_err());

        // the first template is untouched
        assert_eq!(image::open(&path).unwrap().to_rgb8().width(), 3);
        assert!(kb.resolve("save").is_err());

        assert_eq!(kb.learn("SAVE", &original, true).unwrap(), path);
    }
}
