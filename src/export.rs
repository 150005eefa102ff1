//! Persistence of rendered artifacts and the execution log.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join_all;
use mime::Mime;

use crate::error::ReductionError;
use crate::execution_log::ExecutionLog;
use crate::metrics;
use crate::resource_manager::ResourceManager;
use crate::sample::percentage;
use crate::store::{Location, Store};

/// Name of the bar chart of mean total amount per payment type.
pub const BAR_CHART_NAME: &str = "avg-total-amt_by_pmt-type.png";

/// Name of the density map of pickup locations.
pub const DENSITY_MAP_NAME: &str = "pickup-loc_by_avg-trip-dist.png";

/// Name of the scatter plot of a sample, e.g. `trip-dist_vs_total-amt_1.0%-sample.png`.
pub fn scatter_chart_name(fraction: f64) -> String {
    format!("trip-dist_vs_total-amt_{}%-sample.png", percentage(fraction))
}

/// Writes artifacts to a store, bounding the number of concurrent uploads.
#[derive(Clone)]
pub struct ArtifactExporter {
    store: Arc<dyn Store>,
    resource_manager: Arc<ResourceManager>,
}

impl ArtifactExporter {
    pub fn new(store: Arc<dyn Store>, resource_manager: Arc<ResourceManager>) -> Self {
        ArtifactExporter {
            store,
            resource_manager,
        }
    }

    async fn put(&self, location: Location, data: Bytes, content_type: &Mime) -> Result<Location, ReductionError> {
        let _permit = self.resource_manager.upload().await?;
        let size = data.len();
        self.store.put(&location, data, content_type).await?;
        metrics::ARTIFACT_BYTES
            .with_label_values(&[content_type.essence_str()])
            .inc_by(size as u64);
        tracing::info!("Wrote {} bytes to {}", size, location);
        Ok(location)
    }

    /// Write PNG images concurrently, returning their locations once all have been written.
    #[tracing::instrument(level = "DEBUG", skip_all)]
    pub async fn write_images(&self, images: Vec<(Location, Bytes)>) -> Result<Vec<Location>, ReductionError> {
        try_join_all(
            images
                .into_iter()
                .map(|(location, data)| self.put(location, data, &mime::IMAGE_PNG)),
        )
        .await
    }

    /// Write the rendered execution log.
    pub async fn write_log(&self, location: Location, log: &ExecutionLog) -> Result<Location, ReductionError> {
        self.put(location, Bytes::from(log.render()), &mime::TEXT_PLAIN_UTF_8)
            .await
    }

    /// Write the Prometheus text exposition of all registered metrics.
    pub async fn write_metrics(&self, location: Location) -> Result<Location, ReductionError> {
        self.put(location, Bytes::from(metrics::metrics_text()), &mime::TEXT_PLAIN_UTF_8)
            .await
    }
}
