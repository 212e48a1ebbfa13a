use anyhow::{Context, Result};
use chrono::NaiveDate;
use ndarray::{s, Array2};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder, TiffValue};
use tiff::tags::Tag;

use crate::collect::provider::{RasterProvider, RasterRequest};
use crate::geometric::land_cover::NO_DATA_LABEL;
use crate::geometric::raster::{DateWindow, Raster, RasterStack, TimeSlice};

const ELEVATION_SUFFIX: &str = "_elevation.tif";
const DRAINAGE_SUFFIX: &str = "_drainage.tif";
const LAND_USAGE_INFIX: &str = "_land_usage_";
const TIFF_EXTENSION: &str = ".tif";

/// GeoKey ids and values used from the GeoKeyDirectory
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const GCS_WGS_84: u16 = 4326;

/// Georeferenced band: samples in file order plus the affine placement
struct GeoTiffBand {
    width: usize,
    height: usize,
    samples: Vec<f64>,
    origin_x: f64,
    origin_y: f64,
    pixel_width: f64,
    pixel_height: f64,
    nodata: Option<f64>,
}

fn read_band(path: &Path) -> Result<GeoTiffBand> {
    let file =
        File::open(path).with_context(|| format!("Failed to open GeoTIFF: {:?}", path))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to decode TIFF header: {:?}", path))?;

    let (width, height) = decoder
        .dimensions()
        .with_context(|| format!("Failed to get TIFF dimensions: {:?}", path))?;

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .with_context(|| format!("GeoTIFF has no ModelPixelScale tag: {:?}", path))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .with_context(|| format!("GeoTIFF has no ModelTiepoint tag: {:?}", path))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        anyhow::bail!("Malformed georeferencing tags in {:?}", path);
    }

    let pixel_is_point = decoder
        .find_tag_unsigned_vec::<u16>(Tag::GeoKeyDirectoryTag)?
        .and_then(|directory| geo_key(&directory, GT_RASTER_TYPE_GEO_KEY))
        == Some(RASTER_PIXEL_IS_POINT);

    let nodata = match decoder.find_tag(Tag::GdalNodata)? {
        Some(value) => value
            .into_string()?
            .trim_end_matches('\0')
            .trim()
            .parse::<f64>()
            .ok(),
        None => None,
    };

    let samples = match decoder
        .read_image()
        .with_context(|| format!("Failed to read raster data: {:?}", path))?
    {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
    };

    // Tiepoint maps raster point (I, J) to model point (X, Y). With
    // PixelIsPoint, (0, 0) is the centre of the first pixel, not its corner.
    let (pixel_width, pixel_height) = (scale[0], -scale[1]);
    let shift = if pixel_is_point { 0.5 } else { 0.0 };
    Ok(GeoTiffBand {
        width: width as usize,
        height: height as usize,
        samples,
        origin_x: tiepoint[3] - (tiepoint[0] + shift) * pixel_width,
        origin_y: tiepoint[4] - (tiepoint[1] + shift) * pixel_height,
        pixel_width,
        pixel_height,
        nodata,
    })
}

/// Value of a short GeoKey stored inline in the key directory
fn geo_key(directory: &[u16], key: u16) -> Option<u16> {
    // Header of 4 shorts, then entries (KeyID, TIFFTagLocation, Count, Value)
    directory
        .get(4..)?
        .chunks_exact(4)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

impl GeoTiffBand {
    fn into_raster<T: Clone>(self, convert: impl Fn(f64) -> Result<T>) -> Result<Raster<T>> {
        let values = self
            .samples
            .into_iter()
            .map(convert)
            .collect::<Result<Vec<T>>>()?;
        let values = Array2::from_shape_vec((self.height, self.width), values)
            .context("Raster data does not match the TIFF dimensions")?;
        Ok(Raster::from_geotransform(
            values,
            self.origin_x,
            self.origin_y,
            self.pixel_width,
            self.pixel_height,
        )?)
    }
}

/// Read the first band of a GeoTIFF as floats; NoData samples become NaN
pub fn read_geotiff_f64<P: AsRef<Path>>(path: P) -> Result<Raster<f64>> {
    let path = path.as_ref();
    let band = read_band(path)?;
    let nodata = band.nodata;
    let raster = band.into_raster(|v| {
        Ok(match nodata {
            Some(nd) if v == nd => f64::NAN,
            _ => v,
        })
    })?;
    log::debug!("Read {:?} raster from {:?}", raster.shape(), path);
    Ok(raster)
}

/// Read the first band of a GeoTIFF as class labels
///
/// Masked samples (NaN or the GDAL NoData value) become `NO_DATA_LABEL`.
pub fn read_geotiff_u8<P: AsRef<Path>>(path: P) -> Result<Raster<u8>> {
    let path = path.as_ref();
    let band = read_band(path)?;
    let nodata = band.nodata;
    let raster = band.into_raster(|v| {
        if v.is_nan() || nodata == Some(v) {
            Ok(NO_DATA_LABEL)
        } else if v.fract() == 0.0 && (0.0..=255.0).contains(&v) {
            Ok(v as u8)
        } else {
            anyhow::bail!("Value {} in {:?} is not a class label", v, path)
        }
    })?;
    log::debug!("Read {:?} label raster from {:?}", raster.shape(), path);
    Ok(raster)
}

/// Pixel size of an ascending coordinate axis
fn axis_step(coords: &[f64], axis: &str) -> Result<f64> {
    match coords {
        [first, second, ..] => Ok(second - first),
        _ => anyhow::bail!("Cannot derive the {} pixel size from fewer than 2 pixels", axis),
    }
}

fn write_geotiff<C>(path: &Path, raster: &Raster<C::Inner>) -> Result<()>
where
    C: colortype::ColorType,
    C::Inner: Copy,
    [C::Inner]: TiffValue,
{
    let (rows, cols) = raster.shape();
    let pixel_width = axis_step(raster.xs(), "x")?;
    let pixel_height = axis_step(raster.ys(), "y")?;
    let (min_x, max_y) = match (raster.xs().first(), raster.ys().last()) {
        (Some(x), Some(y)) => (x - pixel_width / 2.0, y + pixel_height / 2.0),
        _ => anyhow::bail!("Cannot write an empty raster to {:?}", path),
    };

    // North-up: first row of the file is the northernmost
    let data: Vec<C::Inner> = raster.values().slice(s![..;-1, ..]).iter().copied().collect();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create: {:?}", path))?;
    let mut encoder = TiffEncoder::new(file).context("Failed to create TIFF encoder")?;
    let mut image = encoder
        .new_image::<C>(cols as u32, rows as u32)
        .context("Failed to start TIFF image")?;
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &[pixel_width, pixel_height, 0.0][..])?;
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, min_x, max_y, 0.0][..])?;
    #[rustfmt::skip]
    let key_directory: [u16; 16] = [
        1, 1, 0, 3,
        GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC,
        GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        GEOGRAPHIC_TYPE_GEO_KEY, 0, 1, GCS_WGS_84,
    ];
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &key_directory[..])?;
    image
        .write_data(&data)
        .with_context(|| format!("Failed to write raster data: {:?}", path))?;
    log::info!("Raster saved to: {:?}", path);
    Ok(())
}

/// Write a float raster as a single-band 64-bit GeoTIFF
pub fn write_geotiff_f64<P: AsRef<Path>>(path: P, raster: &Raster<f64>) -> Result<()> {
    write_geotiff::<colortype::Gray64Float>(path.as_ref(), raster)
}

/// Write a label raster as a single-band 8-bit GeoTIFF
pub fn write_geotiff_u8<P: AsRef<Path>>(path: P, raster: &Raster<u8>) -> Result<()> {
    write_geotiff::<colortype::Gray8>(path.as_ref(), raster)
}

/// Per-project GeoTIFF cache
///
/// Layout under `root`:
/// `<project>/<project>_elevation.tif`, `<project>/<project>_drainage.tif`
/// and one `<project>/<project>_land_usage_<YYYY-MM-DD>.tif` per land-cover
/// time slice. The cache is expected to cover the requested area.
#[derive(Debug, Clone)]
pub struct GeoTiffDirectory {
    root: PathBuf,
    project_name: String,
    opened: bool,
}

impl GeoTiffDirectory {
    pub fn new<P: AsRef<Path>>(root: P, project_name: impl Into<String>) -> Self {
        GeoTiffDirectory {
            root: root.as_ref().to_path_buf(),
            project_name: project_name.into(),
            opened: false,
        }
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.join(&self.project_name)
    }

    pub fn elevation_path(&self) -> PathBuf {
        self.project_dir()
            .join(format!("{}{}", self.project_name, ELEVATION_SUFFIX))
    }

    pub fn drainage_path(&self) -> PathBuf {
        self.project_dir()
            .join(format!("{}{}", self.project_name, DRAINAGE_SUFFIX))
    }

    pub fn land_cover_path(&self, date: NaiveDate) -> PathBuf {
        self.project_dir().join(format!(
            "{}{}{}{}",
            self.project_name,
            LAND_USAGE_INFIX,
            date.format("%Y-%m-%d"),
            TIFF_EXTENSION
        ))
    }

    /// Dated land-cover files of the project, in directory order
    pub fn land_cover_files(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        let dir = self.project_dir();
        let prefix = format!("{}{}", self.project_name, LAND_USAGE_INFIX);
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list project directory: {:?}", dir))?
        {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(date) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(TIFF_EXTENSION))
            else {
                continue;
            };
            match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                Ok(date) => files.push((date, path)),
                Err(_) => log::warn!("Skipping land cover file with bad date: {:?}", path),
            }
        }
        Ok(files)
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.opened {
            anyhow::bail!("GeoTIFF provider for '{}' is not open", self.project_name);
        }
        Ok(())
    }
}

impl RasterProvider for GeoTiffDirectory {
    fn open(&mut self) -> Result<()> {
        let dir = self.project_dir();
        if !dir.is_dir() {
            anyhow::bail!("No cached rasters for project '{}' in {:?}", self.project_name, dir);
        }
        self.opened = true;
        log::info!("Opened raster cache {:?}", dir);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        Ok(())
    }

    fn elevation(&self, request: &RasterRequest) -> Result<Raster<f64>> {
        self.ensure_open()?;
        log::debug!("Elevation requested for {:?}", request.bbox);
        read_geotiff_f64(self.elevation_path()).context("Failed to load elevation raster")
    }

    fn drainage(&self, request: &RasterRequest) -> Result<Raster<f64>> {
        self.ensure_open()?;
        log::debug!("Drainage requested for {:?}", request.bbox);
        read_geotiff_f64(self.drainage_path()).context("Failed to load drainage raster")
    }

    fn land_cover(&self, request: &RasterRequest, window: &DateWindow) -> Result<RasterStack<u8>> {
        self.ensure_open()?;
        log::debug!("Land cover requested for {:?}", request.bbox);
        let files = self.land_cover_files()?;
        if files.is_empty() {
            anyhow::bail!(
                "No land cover rasters cached for project '{}'",
                self.project_name
            );
        }

        let slices = files
            .into_iter()
            .filter(|(date, _)| window.contains(*date))
            .map(|(date, path)| {
                Ok(TimeSlice {
                    date,
                    raster: read_geotiff_u8(&path)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RasterStack::new(slices)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::BoundingBox;
    use crate::geometric::land_cover::LandCoverSlice;
    use ndarray::array;

    fn bbox() -> BoundingBox {
        BoundingBox::new(-64.0, -31.0, -63.0, -30.0)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_f64_geotiff_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        let raster = Raster::from_bounds(
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            &bbox(),
        )
        .unwrap();

        write_geotiff_f64(&path, &raster).unwrap();
        let read = read_geotiff_f64(&path).unwrap();

        assert_eq!(read.values(), raster.values());
        for (a, b) in read.xs().iter().zip(raster.xs()) {
            assert!((a - b).abs() < 1e-9);
        }
        for (a, b) in read.ys().iter().zip(raster.ys()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_u8_geotiff_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.tif");
        let raster = Raster::from_bounds(array![[1u8, 4], [2, 6]], &bbox()).unwrap();

        write_geotiff_u8(&path, &raster).unwrap();
        assert_eq!(read_geotiff_u8(&path).unwrap().values(), raster.values());
    }

    #[test]
    fn test_masked_labels_become_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.tif");
        // Float export with a masked pixel
        let exported = Raster::from_bounds(array![[2.0, f64::NAN], [4.0, 1.0]], &bbox()).unwrap();
        write_geotiff_f64(&path, &exported).unwrap();

        let labels = read_geotiff_u8(&path).unwrap();
        let expected = Raster::from_bounds(array![[2u8, NO_DATA_LABEL], [4, 1]], &bbox()).unwrap();
        assert_eq!(labels.values(), expected.values());
        // Grass and the masked pixel are favorable, crops and trees are not
        let slice = LandCoverSlice::from_raster(&labels);
        assert_eq!(slice.favorable_percentage(&bbox()), Some(50.0));
    }

    #[test]
    fn test_fractional_label_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.tif");
        let exported = Raster::from_bounds(array![[2.5, 1.0], [4.0, 1.0]], &bbox()).unwrap();
        write_geotiff_f64(&path, &exported).unwrap();
        assert!(read_geotiff_u8(&path).is_err());
    }

    #[test]
    fn test_geo_key_lookup() {
        #[rustfmt::skip]
        let directory = [
            1, 1, 0, 2,
            GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_GEOGRAPHIC,
            GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_POINT,
        ];
        assert_eq!(geo_key(&directory, GT_RASTER_TYPE_GEO_KEY), Some(RASTER_PIXEL_IS_POINT));
        assert_eq!(geo_key(&directory, GEOGRAPHIC_TYPE_GEO_KEY), None);
        assert_eq!(geo_key(&[1, 1], GT_RASTER_TYPE_GEO_KEY), None);
    }

    #[test]
    fn test_pixel_is_point_placement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("point.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            let mut image = encoder.new_image::<colortype::Gray64Float>(2, 2).unwrap();
            image
                .encoder()
                .write_tag(Tag::ModelPixelScaleTag, &[0.5, 0.5, 0.0][..])
                .unwrap();
            // Tiepoint on the centre of the north-west pixel
            image
                .encoder()
                .write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, 10.25, 20.75, 0.0][..])
                .unwrap();
            #[rustfmt::skip]
            let keys: [u16; 8] = [
                1, 1, 0, 1,
                GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_POINT,
            ];
            image
                .encoder()
                .write_tag(Tag::GeoKeyDirectoryTag, &keys[..])
                .unwrap();
            image.write_data(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        }

        let raster = read_geotiff_f64(&path).unwrap();
        assert_eq!(raster.xs(), &[10.25, 10.75]);
        assert_eq!(raster.ys(), &[20.25, 20.75]);
        // North-up file: the first row read is the northern one
        assert_eq!(raster.values(), &array![[3.0, 4.0], [1.0, 2.0]]);
    }

    #[test]
    fn test_single_pixel_axis_cannot_be_written() {
        let dir = tempfile::tempdir().unwrap();
        let raster = Raster::from_bounds(array![[1.0, 2.0]], &bbox()).unwrap();
        assert!(write_geotiff_f64(dir.path().join("flat.tif"), &raster).is_err());
    }

    #[test]
    fn test_directory_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = GeoTiffDirectory::new(dir.path(), "cordoba");
        // Not cached yet
        assert!(provider.open().is_err());

        let dem = Raster::from_bounds(array![[10.0, 11.0], [12.0, 13.0]], &bbox()).unwrap();
        write_geotiff_f64(provider.elevation_path(), &dem).unwrap();
        write_geotiff_f64(provider.drainage_path(), &dem).unwrap();
        let labels = Raster::from_bounds(array![[2u8, 2], [4, 1]], &bbox()).unwrap();
        write_geotiff_u8(provider.land_cover_path(date(2019, 12, 10)), &labels).unwrap();
        write_geotiff_u8(provider.land_cover_path(date(2020, 3, 1)), &labels).unwrap();

        let request = RasterRequest::for_bbox(bbox());
        assert!(provider.elevation(&request).is_err());
        provider.open().unwrap();

        assert_eq!(provider.elevation(&request).unwrap().values(), dem.values());
        assert_eq!(provider.drainage(&request).unwrap().shape(), (2, 2));

        let window = DateWindow::parse("2019-12-01", "2020-01-01").unwrap();
        let stack = provider.land_cover(&request, &window).unwrap();
        assert_eq!(stack.dates(), vec![date(2019, 12, 10)]);
        assert_eq!(provider.land_cover_files().unwrap().len(), 2);

        provider.close().unwrap();
        assert!(provider.drainage(&request).is_err());
    }

    #[test]
    fn test_missing_layer_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = GeoTiffDirectory::new(dir.path(), "empty");
        std::fs::create_dir_all(provider.project_dir()).unwrap();
        provider.open().unwrap();

        let request = RasterRequest::for_bbox(bbox());
        assert!(provider.elevation(&request).is_err());
        let window = DateWindow::year(2019).unwrap();
        assert!(provider.land_cover(&request, &window).is_err());
    }
}
