//! Synthetic RCM bundle builder shared by the integration suites.
//!
//! Writes a `product.xml` plus `calibration/` siblings into a temp
//! directory; the imagery itself is registered with a
//! [`rcmdata::MemoryOpener`] by each test.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct FixtureOptions {
    pub width: usize,
    pub height: usize,
    pub sample_type: &'static str,
    pub bits_per_sample: u32,
    pub polarizations: Vec<&'static str>,
    pub nitf: bool,
    pub product_type: &'static str,
    pub with_luts: bool,
    /// Sparse gains written to every LUT file.
    pub lut_gains: Vec<f64>,
    pub lut_step: i32,
    pub lut_pixel_first: i32,
    pub lut_offset: f64,
    pub noise_level: f64,
    /// UL, UR, BL, BR corner map coordinates; `None` omits the map
    /// projection block entirely.
    pub corners: Option<[(f64, f64); 4]>,
    /// Put product.xml under `metadata/` instead of the bundle root.
    pub metadata_layout: bool,
    pub incidence_angles: Option<Vec<f64>>,
    pub xmlns: &'static str,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            width: 4,
            height: 2,
            sample_type: "Complex",
            bits_per_sample: 32,
            polarizations: vec!["HH"],
            nitf: false,
            product_type: "SLC",
            with_luts: true,
            lut_gains: vec![5.0, 5.0, 5.0, 5.0],
            lut_step: 1,
            lut_pixel_first: 0,
            lut_offset: 0.0,
            noise_level: -30.0,
            corners: None,
            metadata_layout: false,
            incidence_angles: None,
            xmlns: "rcmGsProductSchema",
        }
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub product_xml: PathBuf,
}

impl Fixture {
    /// Bundle-root directory (what a caller would pass to open).
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn product_xml_str(&self) -> String {
        self.product_xml.display().to_string()
    }

    pub fn subdataset_ref(&self, tag: &str) -> String {
        format!("RCM_CALIB:{}:{}", tag, self.product_xml.display())
    }

    /// Path the opener must serve for a polarization's image file.
    pub fn image_path(&self, pole: &str) -> PathBuf {
        let base = self.product_xml.parent().unwrap();
        base.join("imagery").join(format!("i_{}.tif", pole))
    }

    pub fn nitf_path(&self) -> PathBuf {
        let base = self.product_xml.parent().unwrap();
        base.join("imagery").join("scene.ntf")
    }
}

pub fn write_bundle(opts: &FixtureOptions) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let base = if opts.metadata_layout {
        dir.path().join("metadata")
    } else {
        dir.path().to_path_buf()
    };
    fs::create_dir_all(base.join("calibration")).unwrap();

    let product_xml = base.join("product.xml");
    fs::write(&product_xml, build_product_xml(opts)).unwrap();

    if opts.with_luts {
        for pole in &opts.polarizations {
            for stem in ["lutSigma", "lutBeta", "lutGamma"] {
                let path = base
                    .join("calibration")
                    .join(format!("{}_{}.xml", stem, pole));
                fs::write(&path, build_lut_xml(opts)).unwrap();
            }
            let noise = base
                .join("calibration")
                .join(format!("noiseLevels_{}.xml", pole));
            fs::write(&noise, build_noise_xml(opts)).unwrap();
        }
    }

    if let Some(angles) = &opts.incidence_angles {
        let path = base.join("calibration").join("incidenceAngles.xml");
        fs::write(&path, build_incidence_xml(angles)).unwrap();
    }

    Fixture { dir, product_xml }
}

fn build_product_xml(opts: &FixtureOptions) -> String {
    let polarizations = opts.polarizations.join(" ");

    let ipdfs = if opts.nitf {
        "      <ipdf>imagery/scene.ntf</ipdf>\n".to_string()
    } else {
        opts.polarizations
            .iter()
            .map(|pole| {
                format!(
                    "      <ipdf pole=\"{pole}\">imagery/i_{pole}.tif</ipdf>\n"
                )
            })
            .collect()
    };

    let lut_refs = if opts.with_luts {
        let mut refs = String::new();
        for pole in &opts.polarizations {
            refs.push_str(&format!(
                r#"    <lookupTableFileName sarCalibrationType="Sigma Nought" pole="{pole}">lutSigma_{pole}.xml</lookupTableFileName>
    <lookupTableFileName sarCalibrationType="Beta Nought" pole="{pole}">lutBeta_{pole}.xml</lookupTableFileName>
    <lookupTableFileName sarCalibrationType="Gamma" pole="{pole}">lutGamma_{pole}.xml</lookupTableFileName>
"#
            ));
        }
        for pole in &opts.polarizations {
            refs.push_str(&format!(
                "    <noiseLevelFileName pole=\"{pole}\">noiseLevels_{pole}.xml</noiseLevelFileName>\n"
            ));
        }
        refs
    } else {
        String::new()
    };

    let incidence_ref = if opts.incidence_angles.is_some() {
        "    <incidenceAngleFileName>incidenceAngles.xml</incidenceAngleFileName>\n"
    } else {
        ""
    };

    let map_projection = match opts.corners {
        Some([ul, ur, bl, br]) => format!(
            r#"      <mapProjection>
        <mapProjectionDescriptor>UTM</mapProjectionDescriptor>
        <positioningInformation>
          <upperLeftCorner><mapCoordinate><easting>{}</easting><northing>{}</northing></mapCoordinate></upperLeftCorner>
          <upperRightCorner><mapCoordinate><easting>{}</easting><northing>{}</northing></mapCoordinate></upperRightCorner>
          <lowerLeftCorner><mapCoordinate><easting>{}</easting><northing>{}</northing></mapCoordinate></lowerLeftCorner>
          <lowerRightCorner><mapCoordinate><easting>{}</easting><northing>{}</northing></mapCoordinate></lowerRightCorner>
        </positioningInformation>
        <utmProjectionParameters>
          <utmZone>18</utmZone>
          <hemisphere>northern</hemisphere>
        </utmProjectionParameters>
      </mapProjection>
"#,
            ul.0, ul.1, ur.0, ur.1, bl.0, bl.1, br.0, br.1
        ),
        None => String::new(),
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<product xmlns="{xmlns}">
  <productId>RCM3_OK123456_PK123456</productId>
  <sourceAttributes>
    <satellite>RCM-3</satellite>
    <sensor>SAR</sensor>
    <beamMode>Quad-Polarization</beamMode>
    <rawDataStartTime>2021-06-10T22:15:04.123456Z</rawDataStartTime>
    <radarParameters>
      <polarizations>{polarizations}</polarizations>
      <acquisitionType>Quad-Polarization</acquisitionType>
      <beams>S3</beams>
    </radarParameters>
    <orbitAndAttitude>
      <orbitInformation>
        <passDirection>Descending</passDirection>
      </orbitInformation>
    </orbitAndAttitude>
  </sourceAttributes>
  <imageGenerationParameters>
    <generalProcessingInformation>
      <productType>{product_type}</productType>
      <processingFacility>PGF</processingFacility>
    </generalProcessingInformation>
    <sarProcessingInformation>
      <lutApplied>Unity</lutApplied>
      <perPolarizationScaling>false</perPolarizationScaling>
    </sarProcessingInformation>
  </imageGenerationParameters>
  <imageReferenceAttributes>
    <rasterAttributes>
      <sampleType>{sample_type}</sampleType>
      <dataType>{data_type}</dataType>
      <bitsPerSample>{bits}</bitsPerSample>
      <sampledPixelSpacing>2.33</sampledPixelSpacing>
      <sampledLineSpacing>2.33</sampledLineSpacing>
    </rasterAttributes>
{incidence_ref}{lut_refs}    <geographicInformation>
      <ellipsoidParameters>
        <ellipsoidName>WGS84</ellipsoidName>
        <semiMajorAxis>6378137.0</semiMajorAxis>
        <semiMinorAxis>6356752.314</semiMinorAxis>
      </ellipsoidParameters>
{map_projection}    </geographicInformation>
  </imageReferenceAttributes>
  <sceneAttributes>
    <numberOfEntries>1</numberOfEntries>
    <imageAttributes>
      <samplesPerLine>{width}</samplesPerLine>
      <numLines>{height}</numLines>
      <incAngNearRng>21.4</incAngNearRng>
      <incAngFarRng>47.9</incAngFarRng>
{ipdfs}    </imageAttributes>
  </sceneAttributes>
</product>
"#,
        xmlns = opts.xmlns,
        polarizations = polarizations,
        product_type = opts.product_type,
        sample_type = opts.sample_type,
        data_type = if opts.sample_type == "Complex" || opts.bits_per_sample == 32 {
            "Floating-Point"
        } else {
            "Integer"
        },
        bits = opts.bits_per_sample,
        incidence_ref = incidence_ref,
        lut_refs = lut_refs,
        map_projection = map_projection,
        width = opts.width,
        height = opts.height,
        ipdfs = ipdfs,
    )
}

fn build_lut_xml(opts: &FixtureOptions) -> String {
    let gains = opts
        .lut_gains
        .iter()
        .map(|g| format!("{:e}", g))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<lut xmlns="rcmGsProductSchema">
  <offset>{offset}</offset>
  <pixelFirstLutValue>{pixel_first}</pixelFirstLutValue>
  <stepSize>{step}</stepSize>
  <numberOfValues>{count}</numberOfValues>
  <gains>{gains}</gains>
</lut>
"#,
        offset = opts.lut_offset,
        pixel_first = opts.lut_pixel_first,
        step = opts.lut_step,
        count = opts.lut_gains.len(),
        gains = gains,
    )
}

fn build_noise_xml(opts: &FixtureOptions) -> String {
    let entry = |calibration_type: &str, level: f64| {
        format!(
            r#"  <referenceNoiseLevel>
    <sarCalibrationType>{}</sarCalibrationType>
    <pixelFirstNoiseValue>0</pixelFirstNoiseValue>
    <stepSize>{}</stepSize>
    <numberOfValues>1</numberOfValues>
    <noiseLevelValues>{}</noiseLevelValues>
  </referenceNoiseLevel>
"#,
            calibration_type, opts.width, level
        )
    };
    format!(
        "<?xml version=\"1.0\"?>\n<noiseLevels xmlns=\"rcmGsProductSchema\">\n{}{}{}</noiseLevels>\n",
        entry("Beta Nought", opts.noise_level - 1.0),
        entry("Sigma Nought", opts.noise_level),
        entry("Gamma", opts.noise_level + 1.0),
    )
}

fn build_incidence_xml(angles: &[f64]) -> String {
    let rendered = angles
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        r#"<?xml version="1.0"?>
<incidenceAngles xmlns="rcmGsProductSchema">
  <pixelFirstAnglesValue>0</pixelFirstAnglesValue>
  <stepSize>1</stepSize>
  <numberOfValues>{}</numberOfValues>
  <angles>{}</angles>
</incidenceAngles>
"#,
        angles.len(),
        rendered
    )
}
