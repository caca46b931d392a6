use itertools::Itertools;
use log::info;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    iter::{self, Peekable},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};
use tempfile::TempDir;

use crate::{
    components::{codec::RasterCodec, geometry::CrsGeometry},
    config::NdviConfig,
    errors::{CompositeError, Result},
    merge::{MergeEngine, MergeOptions, MergeSource, Merged, Statistic},
    sensors::sentinel2::{
        constants::NDVI_BAND_RESOLUTIONS,
        metadata::MetadataCache,
        ndvi::build_and_save_ndvi_raster_for_datatake,
        Sentinel2,
    },
    sources::{GeometryProvider, SourceQuery, SourceResolver},
};

/// NDVI composites of one UTM zone, in memory or on disk.
#[derive(Debug, Default)]
pub struct NdviRasters {
    pub crs: String,
    pub mean: Option<Merged>,
    pub min: Option<Merged>,
    pub max: Option<Merged>,
    pub stddev: Option<Merged>,
}

impl NdviRasters {
    pub fn new(crs: impl Into<String>) -> Self {
        Self {
            crs: crs.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, statistic: Statistic) -> Option<&Merged> {
        match statistic {
            Statistic::Mean => self.mean.as_ref(),
            Statistic::Min => self.min.as_ref(),
            Statistic::Max => self.max.as_ref(),
            Statistic::Stddev => self.stddev.as_ref(),
        }
    }

    fn set(&mut self, statistic: Statistic, merged: Merged) {
        let slot = match statistic {
            Statistic::Mean => &mut self.mean,
            Statistic::Min => &mut self.min,
            Statistic::Max => &mut self.max,
            Statistic::Stddev => &mut self.stddev,
        };
        *slot = Some(merged);
    }
}

/// A month of NDVI composites.
#[derive(Debug, Clone, Default)]
pub struct NdviRequest {
    pub year: i32,
    pub month: u32,
    /// Defaults to the configured statistics.
    pub statistics: Option<BTreeSet<Statistic>>,
    /// Write composites to `<destination>/<crs>/<statistic>.tif` instead of
    /// keeping them in memory.
    pub destination: Option<PathBuf>,
}

/// Builds NDVI composites from Sentinel-2 band rasters.
///
/// Datatakes are built concurrently on a worker pool that lives as long as
/// the pipeline.
#[derive(Debug)]
pub struct NdviPipeline<C: RasterCodec> {
    codec: C,
    config: NdviConfig,
    pool: ThreadPool,
    cache: MetadataCache<Sentinel2>,
}

impl<C: RasterCodec> NdviPipeline<C> {
    pub fn new(codec: C, config: &NdviConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.max_workers)
            .thread_name(|index| format!("ndvi-worker-{index}"))
            .build()
            .map_err(|error| CompositeError::InvalidConfig(error.to_string()))?;
        info!("NDVI pipeline with {} workers", config.max_workers);
        Ok(Self {
            codec,
            config: config.clone(),
            pool,
            cache: MetadataCache::new(),
        })
    }

    pub fn cache(&self) -> &MetadataCache<Sentinel2> {
        &self.cache
    }

    /// Requested statistics, falling back to the configured ones.
    fn statistics(&self, requested: Option<&BTreeSet<Statistic>>) -> Result<BTreeSet<Statistic>> {
        let statistics = requested.unwrap_or(&self.config.statistics).clone();
        if statistics.contains(&Statistic::Stddev) && !statistics.contains(&Statistic::Mean) {
            return Err(CompositeError::MissingMean);
        }
        Ok(statistics)
    }

    /// Build one NDVI raster per datatake into `working_directory`, in input
    /// order.
    ///
    /// Files must be grouped by datatake. Each datatake is handed to a worker
    /// as soon as its last file arrives, and results are collected in
    /// submission order.
    fn build_datatakes(
        &self,
        paths: impl Iterator<Item = Result<PathBuf>>,
        crop_to: Option<&CrsGeometry>,
        working_directory: &Path,
    ) -> Result<Vec<PathBuf>> {
        let (codec, cache, resolution) = (&self.codec, &self.cache, self.config.resolution);
        self.pool.in_place_scope(|scope| {
            let mut processed = HashSet::new();
            let mut pending = Vec::new();

            paths
                .map(|path| -> Result<(Arc<str>, PathBuf)> {
                    let path = path?;
                    let metadata = cache.product_metadata(&path)?;
                    Ok((metadata.datatake_timestamp, path))
                })
                .process_results(|files| -> Result<()> {
                    for (datatake, group) in &files.chunk_by(|(datatake, _)| Arc::clone(datatake)) {
                        if !processed.insert(Arc::clone(&datatake)) {
                            return Err(CompositeError::InputOrder {
                                datatake: datatake.to_string(),
                            });
                        }

                        let group: Vec<PathBuf> = group.map(|(_, path)| path).collect();
                        let (sender, receiver) = mpsc::channel();
                        scope.spawn(move |_| {
                            // The receiver is gone only if the zone already failed.
                            let _ = sender.send(build_and_save_ndvi_raster_for_datatake(
                                codec,
                                cache,
                                working_directory,
                                &datatake,
                                &group,
                                crop_to,
                                resolution,
                            ));
                        });
                        pending.push(receiver);
                    }
                    Ok(())
                })??;

            pending
                .into_iter()
                .map(|receiver| {
                    receiver
                        .recv()
                        .map_err(|_| CompositeError::WorkerDisconnected)
                        .and_then(|result| result)
                })
                .collect()
        })
    }

    fn build_zone(
        &self,
        crs: &str,
        paths: impl Iterator<Item = Result<PathBuf>>,
        statistics: Option<&BTreeSet<Statistic>>,
        crop_to: Option<&CrsGeometry>,
        destination: Option<&Path>,
    ) -> Result<NdviRasters> {
        let statistics = self.statistics(statistics)?;
        info!("Building {statistics:?} NDVI rasters for {crs}");

        let output_directory = match destination {
            Some(destination) => {
                fs::create_dir_all(destination)?;
                let output_directory = destination.join(crs);
                fs::create_dir(&output_directory)?;
                Some(output_directory)
            }
            None => None,
        };
        let output_path = |statistic: Statistic| {
            output_directory
                .as_ref()
                .map(|directory| directory.join(format!("{statistic}.tif")))
        };

        let working_directory = TempDir::new()?;
        let ndvi_paths = self.build_datatakes(paths, crop_to, working_directory.path())?;
        let sources: Vec<MergeSource> = ndvi_paths.iter().map(MergeSource::from).collect();
        let engine = MergeEngine::new(&self.codec);

        let mut rasters = NdviRasters::new(crs);
        for statistic in &statistics {
            let Some(method) = statistic.merge_method() else {
                continue;
            };
            info!("Calculating {statistic} NDVI raster in {crs}");
            let mut options = MergeOptions::new(method).without_resampling();
            if let Some(path) = output_path(*statistic) {
                options = options.write_to(path);
            }
            rasters.set(*statistic, engine.merge(&sources, &options)?);
        }

        if statistics.contains(&Statistic::Stddev) {
            info!("Calculating standard deviation NDVI raster in {crs}");
            let mean = rasters.mean.as_ref().ok_or(CompositeError::MissingMean)?;
            let stddev = engine.merge_stddev(
                &sources,
                mean.into(),
                output_path(Statistic::Stddev).as_deref(),
            )?;
            rasters.stddev = Some(stddev);
        }
        Ok(rasters)
    }

    /// Build NDVI composites for one zone from its band rasters and
    /// footprint masks.
    ///
    /// Files must all be in `crs` and grouped by datatake; a datatake seen
    /// twice is an [CompositeError::InputOrder] error. `crop_to` must already
    /// be in `crs`.
    pub fn build_ndvi_rasters_for_crs(
        &self,
        crs: &str,
        raster_paths: impl IntoIterator<Item = PathBuf>,
        statistics: Option<&BTreeSet<Statistic>>,
        crop_to: Option<&CrsGeometry>,
        destination: Option<&Path>,
    ) -> Result<NdviRasters> {
        self.build_zone(
            crs,
            raster_paths.into_iter().map(Ok),
            statistics,
            crop_to,
            destination,
        )
    }

    /// Fetch `raster_keys` in (zone, datatake) order and lazily build one set
    /// of composites per zone.
    pub fn fetch_and_build_ndvi_rasters_from_keys<'p, R, G>(
        &'p self,
        resolver: &'p R,
        raster_keys: impl IntoIterator<Item = String>,
        statistics: Option<BTreeSet<Statistic>>,
        crop_to: Option<&'p G>,
        destination: Option<PathBuf>,
    ) -> Result<ZoneStream<'p, C, G>>
    where
        R: SourceResolver,
        G: GeometryProvider,
    {
        self.statistics(statistics.as_ref())?;

        let mut keys = raster_keys
            .into_iter()
            .map(|key| -> Result<(String, Arc<str>, String)> {
                let metadata = self.cache.product_metadata(&key)?;
                Ok((metadata.crs(), metadata.datatake_timestamp, key))
            })
            .collect::<Result<Vec<_>>>()?;
        keys.sort_by(|lhs, rhs| (&lhs.0, &lhs.1).cmp(&(&rhs.0, &rhs.1)));
        info!("Downloading {} rasters", keys.len());

        let files = keys.into_iter().map(move |(crs, _, key)| {
            resolver
                .fetch(&key)
                .map(|path| (Arc::<str>::from(crs), path))
        });
        Ok(ZoneStream {
            pipeline: self,
            files: (Box::new(files) as Box<dyn Iterator<Item = Result<(Arc<str>, PathBuf)>> + 'p>)
                .peekable(),
            statistics,
            crop_to,
            destination,
            failed: false,
        })
    }

    /// Search for red, NIR and SCL rasters over a month, then build one set
    /// of composites per UTM zone.
    ///
    /// With `crop_to`, composites are cropped to the provider's geometries,
    /// otherwise they cover every intersecting tile.
    pub fn fetch_and_build_ndvi_rasters<'p, R, G>(
        &'p self,
        resolver: &'p R,
        request: NdviRequest,
        crop_to: Option<&'p G>,
    ) -> Result<ZoneStream<'p, C, G>>
    where
        R: SourceResolver,
        G: GeometryProvider,
    {
        let query = SourceQuery {
            year: request.year,
            month: request.month,
            bands: &NDVI_BAND_RESOLUTIONS,
        };
        info!(
            "Searching for rasters in {}-{:02}",
            request.year, request.month
        );
        let keys = resolver.find_raster_keys(&query)?;
        self.fetch_and_build_ndvi_rasters_from_keys(
            resolver,
            keys,
            request.statistics,
            crop_to,
            request.destination,
        )
    }
}

/// Fetched files, tagged with their zone's CRS.
type ZoneFiles<'p> = Peekable<Box<dyn Iterator<Item = Result<(Arc<str>, PathBuf)>> + 'p>>;

/// Composites of each zone, built when pulled.
///
/// Stops after the first error.
pub struct ZoneStream<'p, C: RasterCodec, G: GeometryProvider> {
    pipeline: &'p NdviPipeline<C>,
    files: ZoneFiles<'p>,
    statistics: Option<BTreeSet<Statistic>>,
    crop_to: Option<&'p G>,
    destination: Option<PathBuf>,
    failed: bool,
}

impl<C: RasterCodec, G: GeometryProvider> ZoneStream<'_, C, G> {
    fn next_zone(&mut self) -> Option<Result<NdviRasters>> {
        let (crs, first) = match self.files.next()? {
            Ok(file) => file,
            Err(error) => return Some(Err(error)),
        };
        let crop_to = match self.crop_to.map(|provider| provider.geometries_in(&crs)) {
            Some(Ok(geometry)) => Some(geometry),
            Some(Err(error)) => return Some(Err(error)),
            None => None,
        };

        let files = &mut self.files;
        let rest = iter::from_fn(|| {
            files
                .next_if(|file| file.as_ref().map_or(true, |(file_crs, _)| *file_crs == crs))
                .map(|file| file.map(|(_, path)| path))
        });
        Some(self.pipeline.build_zone(
            &crs,
            iter::once(Ok(first)).chain(rest),
            self.statistics.as_ref(),
            crop_to.as_ref(),
            self.destination.as_deref(),
        ))
    }
}

impl<C: RasterCodec, G: GeometryProvider> Iterator for ZoneStream<'_, C, G> {
    type Item = Result<NdviRasters>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let zone = self.next_zone();
        self.failed = matches!(zone, Some(Err(_)));
        zone
    }
}
