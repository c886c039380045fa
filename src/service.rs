//! Business operations behind the scan, label and image endpoints.

use crate::{
    dispatcher::{Task, TaskDispatcher},
    enums::Orientation,
    error::{Result, ServiceError},
    grid::TileAddress,
    mask::{MaskError, MaskVolume, Selection},
    models::{Label, Scan, ScanCategory, ScanId, ScanMetadata, Slice, SliceStatus},
    repository::{Repository, RepositoryError},
    resolver::{ResolveError, SliceResolver, TileStore},
};

use std::{sync::Arc, time::Instant};
use tracing::{debug, info};

/// Largest `number_of_slices` a scan may declare unless configured otherwise
pub const DEFAULT_MAX_SLICES: u32 = 2048;

#[derive(Clone)]
pub struct ScanService {
    repository: Arc<dyn Repository>,
    dispatcher: Arc<dyn TaskDispatcher>,
    resolver: SliceResolver,
    max_slices: u32,
}

impl ScanService {
    pub fn new(
        repository: Arc<dyn Repository>,
        dispatcher: Arc<dyn TaskDispatcher>,
        tiles: Arc<dyn TileStore>,
    ) -> Self {
        let resolver = SliceResolver::new(Arc::clone(&repository), tiles);
        Self {
            repository,
            dispatcher,
            resolver,
            max_slices: DEFAULT_MAX_SLICES,
        }
    }

    pub fn with_max_slices(mut self, max_slices: u32) -> Self {
        self.max_slices = max_slices;
        self
    }

    pub fn get_available_scan_categories(&self) -> Vec<ScanCategory> {
        self.repository.get_all_categories()
    }

    pub fn scan_category_is_valid(&self, category_key: &str) -> bool {
        self.repository.get_category_by_key(category_key).is_ok()
    }

    pub fn create_scan_category(&self, key: &str, name: &str, image_path: &str) -> Result<ScanCategory> {
        if key.trim().is_empty() {
            return Err(ServiceError::BadRequest("category key must not be empty".into()));
        }
        Ok(self.repository.add_new_category(key, name, image_path)?)
    }

    /// Create a scan that will receive `declared_number_of_slices` uploads
    pub fn create_empty_scan(&self, category_key: &str, declared_number_of_slices: u32) -> Result<Scan> {
        if declared_number_of_slices > self.max_slices {
            return Err(ServiceError::BadRequest(format!(
                "a scan may have at most {} slices, got {declared_number_of_slices}",
                self.max_slices
            )));
        }
        let category = self.repository.get_category_by_key(category_key)?;
        let scan = self.repository.add_new_scan(&category, declared_number_of_slices);
        info!("created scan {} in {} with {} slices", scan.id, category.key, declared_number_of_slices);
        Ok(scan)
    }

    pub fn get_scan(&self, scan_id: ScanId) -> Result<Scan> {
        Ok(self.repository.get_scan_by_id(scan_id)?)
    }

    pub fn get_metadata(&self, scan_id: ScanId) -> Result<ScanMetadata> {
        Ok(self.get_scan(scan_id)?.metadata())
    }

    /// Pick any scan of a category for labeling
    pub fn get_random_scan(&self, category_key: &str) -> Result<ScanMetadata> {
        let category = self.repository.get_category_by_key(category_key)?;
        self.repository
            .get_random_scan(&category)
            .map(|scan| scan.metadata())
            .ok_or_else(|| ServiceError::NotFound("Could not find any Scan for this category!".into()))
    }

    /// Store an uploaded DICOM file as the next axial slice and queue its conversion
    pub fn add_new_slice(&self, scan_id: ScanId, image: Vec<u8>) -> Result<Slice> {
        let mut slice = self.repository.add_new_slice(scan_id, Orientation::Axial)?;
        self.repository.store_original_image(slice.id, image)?;
        self.repository.set_slice_status(slice.id, SliceStatus::Stored)?;
        slice.status = SliceStatus::Stored;

        self.dispatcher.enqueue(Task::ParseDicom { slice_id: slice.id });
        Ok(slice)
    }

    /// Slices `[begin, begin + count)` along `orientation` with their images.
    ///
    /// Slices whose conversion is pending or failed have no image yet and are
    /// left out, so the result may be shorter than `count`.
    pub fn get_slices_for_scan(
        &self,
        scan_id: ScanId,
        begin: usize,
        count: usize,
        orientation: Orientation,
    ) -> Result<Vec<(Slice, Vec<u8>)>> {
        let mut images = Vec::with_capacity(count.min(64));
        for slice in self.resolver.slice_range(scan_id, orientation, begin, count)? {
            match self.resolver.slice_image(&slice) {
                Ok(image) => images.push((slice, image)),
                Err(ResolveError::Repository(RepositoryError::ImageNotFound { .. })) => {
                    debug!("slice {} of scan {scan_id} is {:?}, skipping", slice.location, slice.status);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(images)
    }

    /// Render the mask of every label of a scan for slices `[begin, begin + count)`.
    ///
    /// The mask is synthesized from scratch on every call.
    pub fn get_validation_mask_for_scan(
        &self,
        scan_id: ScanId,
        begin: usize,
        count: usize,
    ) -> Result<Vec<(Slice, Vec<u8>)>> {
        let t0 = Instant::now();
        let scan = self.repository.get_scan_by_id(scan_id)?;
        let slices = self
            .resolver
            .slice_range(scan_id, Orientation::Axial, begin, count)?;
        let geometry = scan
            .mask_geometry()
            .ok_or(ServiceError::ScanNotReady(scan_id))?;
        let labels = self.repository.get_labels_by_scan_id(scan_id)?;

        let mask = MaskVolume::from_selections(
            geometry,
            labels.iter().flat_map(|label| label.selections.iter()),
        )?;
        let planes = mask.render_range(begin, slices.len())?;
        debug!(
            "rendered {} mask planes of scan {scan_id} from {} labels in {:?}",
            planes.len(),
            labels.len(),
            t0.elapsed()
        );

        Ok(slices
            .into_iter()
            .zip(planes)
            .map(|(slice, (_, png))| (slice, png))
            .collect())
    }

    /// Create a label from its selections as one unit.
    ///
    /// Every selection is checked before anything is stored, so a rejected
    /// request leaves no partial label behind.
    pub fn add_label(&self, scan_id: ScanId, selections: Vec<Selection>) -> Result<Label> {
        let scan = self.repository.get_scan_by_id(scan_id)?;
        let num_slices = scan.declared_number_of_slices as usize;
        for selection in &selections {
            selection.validate()?;
            if selection.slice_index as usize >= num_slices {
                return Err(MaskError::SliceOutOfBounds {
                    slice_index: selection.slice_index,
                    num_slices,
                }
                .into());
            }
        }

        let mut label = self.repository.add_new_label(scan_id)?;
        for selection in &selections {
            self.repository
                .add_new_label_selection(label.id, selection.clone())?;
        }
        label.selections = selections;
        info!(
            "added label {} with {} selections to scan {scan_id}",
            label.id,
            label.selections.len()
        );
        Ok(label)
    }

    pub fn get_tile(&self, address: TileAddress) -> Result<Vec<u8>> {
        Ok(self.resolver.tile(address)?)
    }
}
