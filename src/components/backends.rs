use std::{path::Path, sync::Arc};

use crate::{
    components::{
        codec::RasterCodec,
        raster::{Raster, RasterHeader},
        transforms::GeoTransform,
    },
    errors::{CompositeError, Result},
};

/// Parse a GDAL style no-data string.
fn parse_nodata(value: &str) -> Option<f64> {
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    match value.to_ascii_lowercase().as_str() {
        "nan" | "-nan" => Some(f64::NAN),
        _ => value.parse().ok(),
    }
}

/// Native GeoTIFF implementation, no system libraries needed.
pub mod tiff_backend {
    use super::*;
    use ndarray::Array3;
    use num_traits::AsPrimitive;
    use std::{
        fs::File,
        io::{BufReader, BufWriter, Read, Seek},
    };
    use tiff::{
        decoder::{Decoder, DecodingResult, Limits},
        encoder::{colortype::Gray64Float, TiffEncoder},
        tags::Tag,
    };

    const GT_MODEL_TYPE: u16 = 1024;
    const GT_RASTER_TYPE: u16 = 1025;
    const GT_CITATION: u16 = 1026;
    const GEOGRAPHIC_TYPE: u16 = 2048;
    const PROJECTED_CS_TYPE: u16 = 3072;
    const USER_DEFINED: u16 = 32767;

    /// Float64 GeoTIFF, one page per band.
    ///
    /// The transform goes in the pixel scale and tie point tags, the CRS in
    /// the GeoKey directory (EPSG codes) and the ASCII params citation, and
    /// masked pixels are written as NaN with a `nan` GDAL no-data tag.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct TiffCodec;

    fn epsg_code(crs: &str) -> Option<u16> {
        crs.strip_prefix("EPSG:")?.parse().ok()
    }

    fn geo_keys(crs: &str) -> Vec<u16> {
        let citation_len = crs.len() as u16 + 1;
        let mut keys = vec![1, 1, 0, 3];
        match epsg_code(crs) {
            Some(code) if (4000..5000).contains(&code) => {
                keys.extend([GT_MODEL_TYPE, 0, 1, 2, GT_RASTER_TYPE, 0, 1, 1]);
                keys.extend([GT_CITATION, 34737, citation_len, 0]);
                keys.extend([GEOGRAPHIC_TYPE, 0, 1, code]);
            }
            Some(code) => {
                keys.extend([GT_MODEL_TYPE, 0, 1, 1, GT_RASTER_TYPE, 0, 1, 1]);
                keys.extend([GT_CITATION, 34737, citation_len, 0]);
                keys.extend([PROJECTED_CS_TYPE, 0, 1, code]);
            }
            None => {
                keys.extend([GT_MODEL_TYPE, 0, 1, USER_DEFINED, GT_RASTER_TYPE, 0, 1, 1]);
                keys.extend([GT_CITATION, 34737, citation_len, 0]);
            }
        }
        keys[3] = (keys.len() as u16 - 4) / 4;
        keys
    }

    /// EPSG code from the GeoKey directory, when it names one.
    fn crs_from_geo_keys(keys: &[u16]) -> Option<String> {
        keys.get(4..)?.chunks_exact(4).find_map(|key| {
            let (id, location, value) = (key[0], key[1], key[3]);
            let epsg = matches!(id, GEOGRAPHIC_TYPE | PROJECTED_CS_TYPE)
                && location == 0
                && value != USER_DEFINED;
            epsg.then(|| format!("EPSG:{value}"))
        })
    }

    fn missing(path: &Path, tag: &'static str) -> impl FnOnce(tiff::TiffError) -> CompositeError {
        let path = path.to_path_buf();
        move |_| CompositeError::MissingTag { path, tag }
    }

    fn open(path: &Path) -> Result<Decoder<BufReader<File>>> {
        let reader = BufReader::new(File::open(path)?);
        Ok(Decoder::new(reader)?.with_limits(Limits::unlimited()))
    }

    fn decode_header<R: Read + Seek>(
        decoder: &mut Decoder<R>,
        path: &Path,
    ) -> Result<(RasterHeader, Option<f64>)> {
        let (width, height) = decoder.dimensions()?;
        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .map_err(missing(path, "ModelPixelScale"))?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .map_err(missing(path, "ModelTiepoint"))?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(CompositeError::MissingTag {
                path: path.to_path_buf(),
                tag: "ModelTiepoint",
            });
        }
        // tiepoint: [I, J, K, X, Y, Z]
        let xoff = tiepoint[3] - tiepoint[0] * scale[0];
        let yoff = tiepoint[4] + tiepoint[1] * scale[1];
        let transform = GeoTransform::north_up(xoff, yoff, scale[0], scale[1]);

        let geo_keys = decoder
            .find_tag(Tag::GeoKeyDirectoryTag)?
            .map(|value| value.into_u16_vec())
            .transpose()?;
        let citation = decoder
            .find_tag(Tag::GeoAsciiParamsTag)?
            .map(|value| value.into_string())
            .transpose()?;
        let crs = geo_keys
            .as_deref()
            .and_then(crs_from_geo_keys)
            .or_else(|| {
                citation.as_deref().and_then(|citation| {
                    citation
                        .split('|')
                        .next()
                        .filter(|crs| !crs.is_empty())
                        .map(str::to_owned)
                })
            })
            .ok_or(CompositeError::MissingCrs)?;

        let nodata = decoder
            .find_tag(Tag::GdalNodata)?
            .map(|value| value.into_string())
            .transpose()?
            .as_deref()
            .and_then(parse_nodata);

        let mut band_count = 1;
        while decoder.more_images() {
            decoder.next_image()?;
            band_count += 1;
        }

        let header = RasterHeader {
            band_count,
            height: height as usize,
            width: width as usize,
            transform,
            crs: Arc::from(crs),
        };
        Ok((header, nodata))
    }

    fn widen<T: AsPrimitive<f64>>(buffer: Vec<T>) -> Vec<f64> {
        buffer.into_iter().map(AsPrimitive::as_).collect()
    }

    fn decode_band(decoder: &mut Decoder<BufReader<File>>, path: &Path) -> Result<Vec<f64>> {
        let values = match decoder.read_image()? {
            DecodingResult::F64(buffer) => buffer,
            DecodingResult::F32(buffer) => widen(buffer),
            DecodingResult::U8(buffer) => widen(buffer),
            DecodingResult::U16(buffer) => widen(buffer),
            DecodingResult::U32(buffer) => widen(buffer),
            DecodingResult::U64(buffer) => widen(buffer),
            DecodingResult::I8(buffer) => widen(buffer),
            DecodingResult::I16(buffer) => widen(buffer),
            DecodingResult::I32(buffer) => widen(buffer),
            DecodingResult::I64(buffer) => widen(buffer),
            _ => return Err(CompositeError::UnsupportedPixelFormat(path.to_path_buf())),
        };
        Ok(values)
    }

    impl RasterCodec for TiffCodec {
        fn read_header(&self, path: &Path) -> Result<RasterHeader> {
            let mut decoder = open(path)?;
            Ok(decode_header(&mut decoder, path)?.0)
        }

        fn read(&self, path: &Path) -> Result<Raster> {
            let (header, nodata) = decode_header(&mut open(path)?, path)?;
            let (band_count, height, width) = header.shape();

            let mut decoder = open(path)?;
            let mut values = Vec::with_capacity(band_count * height * width);
            for band_index in 0..band_count {
                if band_index > 0 {
                    decoder.next_image()?;
                }
                let band = decode_band(&mut decoder, path)?;
                if band.len() != height * width {
                    return Err(CompositeError::UnsupportedPixelFormat(path.to_path_buf()));
                }
                values.extend(band);
            }

            let pixels = Array3::from_shape_vec(header.shape(), values)?;
            match nodata {
                Some(nodata) => {
                    Raster::masked_equal(pixels, nodata, header.transform, header.crs)
                }
                None => Raster::from_pixels(pixels, header.transform, header.crs),
            }
        }

        fn write(&self, raster: &Raster, path: &Path) -> Result<()> {
            let writer = BufWriter::new(File::create(path)?);
            let mut encoder = TiffEncoder::new(writer)?;

            let transform = raster.transform();
            let (xres, yres) = transform.resolution();
            let scale = [xres, yres, 0.];
            let tiepoint = [0., 0., 0., transform.xoff(), transform.yoff(), 0.];
            let citation = format!("{}|", raster.crs());
            let keys = geo_keys(raster.crs());

            let (_, height, width) = raster.shape();
            for band in raster.filled(f64::NAN).outer_iter() {
                let mut image = encoder.new_image::<Gray64Float>(width as u32, height as u32)?;
                image
                    .encoder()
                    .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
                image
                    .encoder()
                    .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
                image
                    .encoder()
                    .write_tag(Tag::GeoKeyDirectoryTag, keys.as_slice())?;
                image
                    .encoder()
                    .write_tag(Tag::GeoAsciiParamsTag, citation.as_str())?;
                image.encoder().write_tag(Tag::GdalNodata, "nan")?;
                let data: Vec<f64> = band.iter().copied().collect();
                image.write_data(&data)?;
            }
            Ok(())
        }
    }

}

/// Implementations for gdal
#[cfg(feature = "gdal")]
pub mod gdal_backend {
    use super::*;
    use gdal::{raster::Buffer, spatial_ref::SpatialRef, Dataset as GdalDataset, DriverManager};
    use ndarray::Array3;

    /// Any raster format GDAL can open; writes GeoTIFF.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct GdalCodec;

    fn crs_of(dataset: &GdalDataset) -> Result<Arc<str>> {
        let spatial_ref = dataset.spatial_ref()?;
        let crs = match (spatial_ref.auth_name(), spatial_ref.auth_code()) {
            (Ok(name), Ok(code)) => format!("{name}:{code}"),
            _ => dataset.projection(),
        };
        if crs.is_empty() {
            return Err(CompositeError::MissingCrs);
        }
        Ok(Arc::from(crs))
    }

    fn header_of(dataset: &GdalDataset) -> Result<RasterHeader> {
        let (width, height) = dataset.raster_size();
        Ok(RasterHeader {
            band_count: dataset.raster_count(),
            height,
            width,
            transform: GeoTransform::from_gdal(dataset.geo_transform()?),
            crs: crs_of(dataset)?,
        })
    }

    impl RasterCodec for GdalCodec {
        fn read_header(&self, path: &Path) -> Result<RasterHeader> {
            header_of(&GdalDataset::open(path)?)
        }

        fn read(&self, path: &Path) -> Result<Raster> {
            let dataset = GdalDataset::open(path)?;
            let header = header_of(&dataset)?;
            let (band_count, height, width) = header.shape();

            let mut values = Vec::with_capacity(band_count * height * width);
            let mut nodata = Vec::with_capacity(band_count);
            for band_index in 1..=band_count {
                let rasterband = dataset.rasterband(band_index)?;
                let buffer =
                    rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
                values.extend_from_slice(buffer.data());
                nodata.push(rasterband.no_data_value());
            }

            let pixels = Array3::from_shape_vec(header.shape(), values)?;
            let mut valid = pixels.mapv(|value| !value.is_nan());
            for (band_index, nodata) in nodata.into_iter().enumerate() {
                if let Some(nodata) = nodata {
                    valid
                        .index_axis_mut(ndarray::Axis(0), band_index)
                        .zip_mut_with(&pixels.index_axis(ndarray::Axis(0), band_index), |valid, value| {
                            *valid &= *value != nodata
                        });
                }
            }
            Raster::new(pixels, valid, header.transform, header.crs)
        }

        fn write(&self, raster: &Raster, path: &Path) -> Result<()> {
            let driver = DriverManager::get_driver_by_name("GTiff")?;
            let (band_count, height, width) = raster.shape();
            let mut dataset =
                driver.create_with_band_type::<f64, _>(path, width, height, band_count)?;
            dataset.set_geo_transform(&raster.transform().to_gdal())?;
            dataset.set_spatial_ref(&SpatialRef::from_definition(raster.crs())?)?;

            for (band_index, band) in raster.filled(f64::NAN).outer_iter().enumerate() {
                let mut rasterband = dataset.rasterband(band_index + 1)?;
                rasterband.set_no_data_value(Some(f64::NAN))?;
                let mut buffer = Buffer::new((width, height), band.iter().copied().collect());
                rasterband.write((0, 0), (width, height), &mut buffer)?;
            }
            Ok(())
        }
    }
}
