//! JSON records served to clients.
//!
//! The shape of a [`ScanRecord`] depends on the scan's MS level:
//! MSn records carry a single `precursor_information` object with its
//! isolation window nested inside, while MS1 records carry parallel
//! `precursor_information` and `isolation_window` lists describing the
//! scans that were acquired from them.
use serde::Serialize;

use crate::index::{ScanIndex, ScanIndexRecord};
use crate::peaks::{DeconvolutedPeak, EnvelopePeak};
use crate::pipeline::{PrecursorDetails, PrecursorInformation, ProcessedScan};
use crate::source::IsolationWindow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointRecord {
    pub mz: f64,
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeconvolutedPointRecord {
    pub neutral_mass: f64,
    pub mz: f64,
    pub charge: i32,
    pub intensity: f32,
    pub score: f64,
    pub envelope: Vec<PointRecord>,
}

impl From<&EnvelopePeak> for PointRecord {
    fn from(value: &EnvelopePeak) -> Self {
        Self {
            mz: value.mz,
            intensity: value.intensity,
        }
    }
}

impl From<&DeconvolutedPeak> for DeconvolutedPointRecord {
    fn from(value: &DeconvolutedPeak) -> Self {
        Self {
            neutral_mass: value.neutral_mass,
            mz: value.mz,
            charge: value.charge,
            intensity: value.intensity,
            score: value.score,
            envelope: value.envelope.iter().map(PointRecord::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecursorRecord {
    pub mz: f64,
    pub charge: Option<i32>,
    pub intensity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precursor_scan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_scan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation_window: Option<IsolationWindow>,
}

impl PrecursorRecord {
    fn from_product(value: &PrecursorInformation) -> Self {
        Self {
            isolation_window: None,
            ..Self::from(value)
        }
    }
}

impl From<&PrecursorInformation> for PrecursorRecord {
    fn from(value: &PrecursorInformation) -> Self {
        Self {
            mz: value.mz,
            charge: value.charge,
            intensity: value.intensity,
            precursor_scan_id: value.precursor_scan_id.clone(),
            product_scan_id: value.product_scan_id.clone(),
            isolation_window: value.isolation_window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrecursorField {
    Single(PrecursorRecord),
    Products(Vec<PrecursorRecord>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub scan_id: String,
    pub index: usize,
    pub ms_level: u8,
    pub scan_time: f64,
    pub is_profile: bool,
    pub mz: Vec<f64>,
    pub intensity: Vec<f32>,
    pub points: Vec<PointRecord>,
    pub deconvoluted_points: Vec<DeconvolutedPointRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precursor_information: Option<PrecursorField>,
    /// Only populated for MS1 scans, parallel to `precursor_information`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation_window: Option<Vec<Option<IsolationWindow>>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deconvolution_degraded: bool,
}

impl From<&ProcessedScan> for ScanRecord {
    fn from(value: &ProcessedScan) -> Self {
        let description = &value.description;
        let (precursor_information, isolation_window) = match &value.precursor {
            PrecursorDetails::None => (None, None),
            PrecursorDetails::Precursor(info) => {
                (Some(PrecursorField::Single(PrecursorRecord::from(info))), None)
            }
            PrecursorDetails::Products(products) => (
                Some(PrecursorField::Products(
                    products.iter().map(PrecursorRecord::from_product).collect(),
                )),
                Some(products.iter().map(|p| p.isolation_window).collect()),
            ),
        };
        Self {
            scan_id: description.id.clone(),
            index: description.index,
            ms_level: description.ms_level,
            scan_time: description.scan_time,
            is_profile: description.is_profile,
            mz: value.mz_array.clone(),
            intensity: value.intensity_array.clone(),
            points: value
                .peaks
                .iter()
                .map(|p| PointRecord {
                    mz: p.mz,
                    intensity: p.intensity,
                })
                .collect(),
            deconvoluted_points: value
                .deconvoluted_peaks
                .iter()
                .map(DeconvolutedPointRecord::from)
                .collect(),
            precursor_information,
            isolation_window,
            deconvolution_degraded: value.deconvolution_degraded,
        }
    }
}

/// One row of a file's scan listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexListingRecord {
    pub scan_id: String,
    pub index: usize,
    pub scan_time: f64,
    pub ms_level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precursor_scan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationRecord>,
}

/// How an MSn scan's precursor was fragmented
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationRecord {
    pub method: String,
}

impl From<&ScanIndexRecord> for IndexListingRecord {
    fn from(value: &ScanIndexRecord) -> Self {
        let precursor = value.precursor.as_ref();
        Self {
            scan_id: value.scan_id.clone(),
            index: value.index,
            scan_time: value.scan_time,
            ms_level: value.ms_level,
            mz: precursor.map(|p| p.mz),
            charge: precursor.and_then(|p| p.charge),
            precursor_scan_id: precursor.and_then(|p| p.precursor_scan_id.clone()),
            activation: precursor
                .and_then(|p| p.activation.clone())
                .map(|method| ActivationRecord { method }),
        }
    }
}

/// Every scan in a file, ordered by scan time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexListing {
    pub records: Vec<IndexListingRecord>,
    pub scan_count: usize,
}

impl From<&ScanIndex> for IndexListing {
    fn from(value: &ScanIndex) -> Self {
        let records: Vec<IndexListingRecord> = value
            .records_by_time()
            .into_iter()
            .map(IndexListingRecord::from)
            .collect();
        Self {
            scan_count: records.len(),
            records,
        }
    }
}

/// A registered file, as listed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileListingRecord {
    pub key: String,
    pub path: String,
    pub scan_count: usize,
}

#[cfg(test)]
mod test {
    use serde_json::{json, Value};

    use super::*;
    use crate::index::PrecursorSummary;
    use crate::peaks::PickedPeak;
    use crate::source::ScanDescription;

    fn processed(ms_level: u8, precursor: PrecursorDetails) -> ProcessedScan {
        ProcessedScan {
            description: ScanDescription {
                id: "scan=7".into(),
                index: 6,
                ms_level,
                scan_time: 12.5,
                is_profile: false,
                precursor: None,
            },
            mz_array: vec![100.0, 200.0],
            intensity_array: vec![5.0, 7.0],
            peaks: vec![
                PickedPeak::new(100.0, 5.0, 0.0, 0.0),
                PickedPeak::new(200.0, 7.0, 0.0, 0.0),
            ],
            deconvoluted_peaks: vec![DeconvolutedPeak {
                neutral_mass: 198.0,
                mz: 100.0,
                charge: 2,
                intensity: 5.0,
                score: 12.0,
                envelope: vec![EnvelopePeak::new(100.0, 5.0), EnvelopePeak::new(100.5, 0.0)],
            }],
            precursor,
            ..Default::default()
        }
    }

    #[test]
    fn test_msn_shape() {
        let info = PrecursorInformation {
            mz: 500.2,
            charge: Some(2),
            intensity: 1000.0,
            precursor_scan_id: Some("scan=1".into()),
            product_scan_id: None,
            isolation_window: Some(IsolationWindow::new(500.2, 499.5, 500.9)),
        };
        let record = ScanRecord::from(&processed(2, PrecursorDetails::Precursor(info)));
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["scan_id"], "scan=7");
        assert_eq!(value["points"], json!([{"mz": 100.0, "intensity": 5.0}, {"mz": 200.0, "intensity": 7.0}]));
        assert_eq!(value["deconvoluted_points"][0]["charge"], 2);
        assert_eq!(value["deconvoluted_points"][0]["envelope"][1]["intensity"], 0.0);

        let precursor = &value["precursor_information"];
        assert!(precursor.is_object());
        assert_eq!(precursor["mz"], 500.2);
        assert_eq!(precursor["charge"], 2);
        assert_eq!(precursor["precursor_scan_id"], "scan=1");
        assert_eq!(precursor["isolation_window"]["lower_bound"], 499.5);
        assert!(value.get("isolation_window").is_none());
        assert!(value.get("deconvolution_degraded").is_none());
    }

    #[test]
    fn test_ms1_shape() {
        let product = |id: &str, mz: f64| PrecursorInformation {
            mz,
            charge: Some(2),
            intensity: 10.0,
            precursor_scan_id: Some("scan=7".into()),
            product_scan_id: Some(id.into()),
            isolation_window: Some(IsolationWindow::new(mz, mz - 1.0, mz + 1.0)),
        };
        let record = ScanRecord::from(&processed(
            1,
            PrecursorDetails::Products(vec![product("scan=8", 450.0), product("scan=9", 620.0)]),
        ));
        let value = serde_json::to_value(&record).unwrap();

        let precursors = value["precursor_information"].as_array().unwrap();
        let windows = value["isolation_window"].as_array().unwrap();
        assert_eq!(precursors.len(), 2);
        assert_eq!(windows.len(), 2);
        assert_eq!(precursors[0]["product_scan_id"], "scan=8");
        assert_eq!(precursors[1]["mz"], 620.0);
        assert!(precursors[0].get("isolation_window").is_none());
        assert_eq!(windows[1]["upper_bound"], 621.0);
    }

    #[test]
    fn test_no_precursor_fields() {
        let mut scan = processed(2, PrecursorDetails::None);
        scan.deconvolution_degraded = true;
        let value = serde_json::to_value(ScanRecord::from(&scan)).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("precursor_information"));
        assert!(!obj.contains_key("isolation_window"));
        assert_eq!(value["deconvolution_degraded"], Value::Bool(true));
    }

    #[test]
    fn test_index_listing() {
        let mut index = ScanIndex::new("run".into());
        index.insert(ScanIndexRecord {
            scan_id: "b".into(),
            index: 0,
            scan_time: 2.0,
            ms_level: 1,
            precursor: None,
        });
        index.insert(ScanIndexRecord {
            scan_id: "a".into(),
            index: 1,
            scan_time: 1.0,
            ms_level: 2,
            precursor: Some(PrecursorSummary {
                mz: 512.3,
                charge: Some(3),
                precursor_scan_id: Some("b".into()),
                activation: Some("electron transfer dissociation".into()),
            }),
        });
        let value = serde_json::to_value(IndexListing::from(&index)).unwrap();
        assert_eq!(value["scan_count"], 2);
        assert_eq!(value["records"][0]["scan_id"], "a");
        assert_eq!(value["records"][0]["mz"], 512.3);
        assert_eq!(value["records"][0]["charge"], 3);
        assert_eq!(value["records"][0]["precursor_scan_id"], "b");
        assert_eq!(
            value["records"][0]["activation"],
            json!({"method": "electron transfer dissociation"})
        );
        assert!(value["records"][1].get("activation").is_none());
        assert!(value["records"][1].get("mz").is_none());
    }
}
