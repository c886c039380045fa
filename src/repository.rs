//! Storage collaborator for scans, slices and labels.
//!
//! [`Repository`] is the interface the service consumes; [`InMemoryRepository`]
//! is the implementation the server runs with.

use crate::{
    enums::Orientation,
    mask::Selection,
    models::{Label, LabelId, Scan, ScanCategory, ScanId, Slice, SliceId, SliceStatus},
};

use rand::seq::SliceRandom;
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Scan {0} not found")]
    ScanNotFound(ScanId),

    #[error("Slice {0} not found")]
    SliceNotFound(SliceId),

    #[error("Label {0} not found")]
    LabelNotFound(LabelId),

    #[error("Category '{0}' not found")]
    CategoryNotFound(String),

    #[error("Category '{0}' already exists")]
    DuplicateCategory(String),

    #[error("No {kind} image stored for slice {slice_id}")]
    ImageNotFound { slice_id: SliceId, kind: &'static str },
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

pub trait Repository: Send + Sync {
    fn get_all_categories(&self) -> Vec<ScanCategory>;
    fn get_category_by_key(&self, key: &str) -> Result<ScanCategory>;
    fn add_new_category(&self, key: &str, name: &str, image_path: &str) -> Result<ScanCategory>;

    fn add_new_scan(&self, category: &ScanCategory, declared_number_of_slices: u32) -> Scan;
    fn get_scan_by_id(&self, scan_id: ScanId) -> Result<Scan>;
    fn get_random_scan(&self, category: &ScanCategory) -> Option<Scan>;
    /// Record the plane size of a scan, first writer wins
    fn set_scan_geometry(&self, scan_id: ScanId, width: u32, height: u32) -> Result<Scan>;

    /// Append a slice at the next free location of `orientation`
    fn add_new_slice(&self, scan_id: ScanId, orientation: Orientation) -> Result<Slice>;
    fn get_slice_by_id(&self, slice_id: SliceId) -> Result<Slice>;
    /// Slices of a scan along `orientation`, ordered by location
    fn get_slices_by_scan_id(&self, scan_id: ScanId, orientation: Orientation) -> Result<Vec<Slice>>;
    fn set_slice_status(&self, slice_id: SliceId, status: SliceStatus) -> Result<()>;
    fn store_original_image(&self, slice_id: SliceId, image: Vec<u8>) -> Result<()>;
    fn get_original_image(&self, slice_id: SliceId) -> Result<Vec<u8>>;
    fn store_converted_image(&self, slice_id: SliceId, image: Vec<u8>) -> Result<()>;
    fn get_slice_converted_image(&self, slice_id: SliceId) -> Result<Vec<u8>>;

    fn add_new_label(&self, scan_id: ScanId) -> Result<Label>;
    fn add_new_label_selection(&self, label_id: LabelId, selection: Selection) -> Result<()>;
    fn get_labels_by_scan_id(&self, scan_id: ScanId) -> Result<Vec<Label>>;
}

#[derive(Default)]
struct Store {
    categories: HashMap<String, ScanCategory>,
    scans: HashMap<ScanId, Scan>,
    slices: HashMap<SliceId, Slice>,
    original_images: HashMap<SliceId, Vec<u8>>,
    converted_images: HashMap<SliceId, Vec<u8>>,
    labels: HashMap<LabelId, Label>,
}

impl Store {
    fn scan(&self, scan_id: ScanId) -> Result<&Scan> {
        self.scans
            .get(&scan_id)
            .ok_or(RepositoryError::ScanNotFound(scan_id))
    }

    fn slice_exists(&self, slice_id: SliceId) -> Result<()> {
        if self.slices.contains_key(&slice_id) {
            Ok(())
        } else {
            Err(RepositoryError::SliceNotFound(slice_id))
        }
    }
}

#[derive(Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Repository for InMemoryRepository {
    fn get_all_categories(&self) -> Vec<ScanCategory> {
        let mut categories: Vec<_> = self.read().categories.values().cloned().collect();
        categories.sort_by(|a, b| a.key.cmp(&b.key));
        categories
    }

    fn get_category_by_key(&self, key: &str) -> Result<ScanCategory> {
        self.read()
            .categories
            .get(key)
            .cloned()
            .ok_or_else(|| RepositoryError::CategoryNotFound(key.to_string()))
    }

    fn add_new_category(&self, key: &str, name: &str, image_path: &str) -> Result<ScanCategory> {
        let mut store = self.write();
        if store.categories.contains_key(key) {
            return Err(RepositoryError::DuplicateCategory(key.to_string()));
        }
        let category = ScanCategory {
            key: key.to_string(),
            name: name.to_string(),
            image_path: image_path.to_string(),
        };
        store.categories.insert(category.key.clone(), category.clone());
        Ok(category)
    }

    fn add_new_scan(&self, category: &ScanCategory, declared_number_of_slices: u32) -> Scan {
        let scan = Scan {
            id: Uuid::new_v4(),
            category_key: category.key.clone(),
            declared_number_of_slices,
            width: None,
            height: None,
        };
        self.write().scans.insert(scan.id, scan.clone());
        scan
    }

    fn get_scan_by_id(&self, scan_id: ScanId) -> Result<Scan> {
        self.read().scan(scan_id).cloned()
    }

    fn get_random_scan(&self, category: &ScanCategory) -> Option<Scan> {
        let store = self.read();
        let candidates: Vec<&Scan> = store
            .scans
            .values()
            .filter(|scan| scan.category_key == category.key)
            .collect();
        candidates
            .choose(&mut rand::thread_rng())
            .map(|scan| (*scan).clone())
    }

    fn set_scan_geometry(&self, scan_id: ScanId, width: u32, height: u32) -> Result<Scan> {
        let mut store = self.write();
        let scan = store
            .scans
            .get_mut(&scan_id)
            .ok_or(RepositoryError::ScanNotFound(scan_id))?;
        if scan.width.is_none() || scan.height.is_none() {
            scan.width = Some(width);
            scan.height = Some(height);
        }
        Ok(scan.clone())
    }

    fn add_new_slice(&self, scan_id: ScanId, orientation: Orientation) -> Result<Slice> {
        let mut store = self.write();
        store.scan(scan_id)?;
        let location = store
            .slices
            .values()
            .filter(|s| s.scan_id == scan_id && s.orientation == orientation)
            .count() as u32;
        let slice = Slice {
            id: Uuid::new_v4(),
            scan_id,
            orientation,
            location,
            status: SliceStatus::New,
        };
        store.slices.insert(slice.id, slice.clone());
        Ok(slice)
    }

    fn get_slice_by_id(&self, slice_id: SliceId) -> Result<Slice> {
        self.read()
            .slices
            .get(&slice_id)
            .cloned()
            .ok_or(RepositoryError::SliceNotFound(slice_id))
    }

    fn get_slices_by_scan_id(&self, scan_id: ScanId, orientation: Orientation) -> Result<Vec<Slice>> {
        let store = self.read();
        store.scan(scan_id)?;
        let mut slices: Vec<Slice> = store
            .slices
            .values()
            .filter(|s| s.scan_id == scan_id && s.orientation == orientation)
            .cloned()
            .collect();
        slices.sort_by_key(|s| s.location);
        Ok(slices)
    }

    fn set_slice_status(&self, slice_id: SliceId, status: SliceStatus) -> Result<()> {
        let mut store = self.write();
        let slice = store
            .slices
            .get_mut(&slice_id)
            .ok_or(RepositoryError::SliceNotFound(slice_id))?;
        slice.status = status;
        Ok(())
    }

    fn store_original_image(&self, slice_id: SliceId, image: Vec<u8>) -> Result<()> {
        let mut store = self.write();
        store.slice_exists(slice_id)?;
        store.original_images.insert(slice_id, image);
        Ok(())
    }

    fn get_original_image(&self, slice_id: SliceId) -> Result<Vec<u8>> {
        let store = self.read();
        store.slice_exists(slice_id)?;
        store
            .original_images
            .get(&slice_id)
            .cloned()
            .ok_or(RepositoryError::ImageNotFound {
                slice_id,
                kind: "original",
            })
    }

    fn store_converted_image(&self, slice_id: SliceId, image: Vec<u8>) -> Result<()> {
        let mut store = self.write();
        store.slice_exists(slice_id)?;
        store.converted_images.insert(slice_id, image);
        Ok(())
    }

    fn get_slice_converted_image(&self, slice_id: SliceId) -> Result<Vec<u8>> {
        let store = self.read();
        store.slice_exists(slice_id)?;
        store
            .converted_images
            .get(&slice_id)
            .cloned()
            .ok_or(RepositoryError::ImageNotFound {
                slice_id,
                kind: "converted",
            })
    }

    fn add_new_label(&self, scan_id: ScanId) -> Result<Label> {
        let mut store = self.write();
        store.scan(scan_id)?;
        let label = Label {
            id: Uuid::new_v4(),
            scan_id,
            selections: Vec::new(),
        };
        store.labels.insert(label.id, label.clone());
        Ok(label)
    }

    fn add_new_label_selection(&self, label_id: LabelId, selection: Selection) -> Result<()> {
        let mut store = self.write();
        let label = store
            .labels
            .get_mut(&label_id)
            .ok_or(RepositoryError::LabelNotFound(label_id))?;
        label.selections.push(selection);
        Ok(())
    }

    fn get_labels_by_scan_id(&self, scan_id: ScanId) -> Result<Vec<Label>> {
        let store = self.read();
        store.scan(scan_id)?;
        Ok(store
            .labels
            .values()
            .filter(|label| label.scan_id == scan_id)
            .cloned()
            .collect())
    }
}
