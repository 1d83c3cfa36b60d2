//! Recognized measure families and their curated logic
//!
//! Families are matched on measure id prefix or title keyword. Each profile is
//! plain data: the generators lower its criteria with the same retrieve
//! builders they use for authored trees.

use octofhir_measure_ir::{ClinicalType, Confidence, MeasureMetadata, ValueSetReference};
use serde::Serialize;

use crate::Lookback;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureFamily {
    ColorectalScreening,
    CervicalScreening,
    BreastScreening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuratedValueSet {
    pub name: &'static str,
    pub oid: &'static str,
}

impl CuratedValueSet {
    pub fn to_reference(&self) -> ValueSetReference {
        let mut vs = ValueSetReference::new(self.oid, self.name).with_oid(self.oid);
        vs.confidence = Confidence::High;
        vs
    }
}

/// One curated criterion, lowered to a named helper definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyCriterion {
    pub define_name: &'static str,
    pub value_set: CuratedValueSet,
    pub clinical_type: ClinicalType,
    /// `None` means any time on or before the end of the measurement period
    pub lookback: Option<Lookback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyProfile {
    pub family: MeasureFamily,
    pub measure_ids: &'static [&'static str],
    pub title_keywords: &'static [&'static str],
    pub age_min: u32,
    pub age_max: u32,
    /// Administrative gender required by the initial population
    pub gender: Option<&'static str>,
    /// Any of these satisfies the numerator
    pub numerator: &'static [FamilyCriterion],
    /// Any of these excludes from the denominator
    pub exclusions: &'static [FamilyCriterion],
}

impl FamilyProfile {
    pub fn matches(&self, metadata: &MeasureMetadata) -> bool {
        let id = metadata.measure_id.trim().to_ascii_uppercase();
        let id_match = self.measure_ids.iter().any(|prefix| {
            id.strip_prefix(*prefix)
                .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
        });
        let title = metadata.title.to_lowercase();
        id_match || self.title_keywords.iter().any(|k| title.contains(*k))
    }

    pub fn criteria(&self) -> impl Iterator<Item = &FamilyCriterion> {
        self.numerator.iter().chain(self.exclusions)
    }

    pub fn value_sets(&self) -> Vec<ValueSetReference> {
        self.criteria().map(|c| c.value_set.to_reference()).collect()
    }
}

const fn vs(name: &'static str, oid: &'static str) -> CuratedValueSet {
    CuratedValueSet { name, oid }
}

const fn criterion(
    define_name: &'static str,
    value_set: CuratedValueSet,
    clinical_type: ClinicalType,
    lookback: Option<Lookback>,
) -> FamilyCriterion {
    FamilyCriterion {
        define_name,
        value_set,
        clinical_type,
        lookback,
    }
}

pub static FAMILY_PROFILES: &[FamilyProfile] = &[
    FamilyProfile {
        family: MeasureFamily::ColorectalScreening,
        measure_ids: &["CMS130"],
        title_keywords: &["colorectal", "colon cancer"],
        age_min: 46,
        age_max: 75,
        gender: None,
        numerator: &[
            criterion(
                "Colonoscopy Performed",
                vs("Colonoscopy", "2.16.840.1.113883.3.464.1003.108.12.1020"),
                ClinicalType::Procedure,
                Some(Lookback::years(10)),
            ),
            criterion(
                "Fecal Occult Blood Test Performed",
                vs("Fecal Occult Blood Test (FOBT)", "2.16.840.1.113883.3.464.1003.198.12.1011"),
                ClinicalType::Observation,
                Some(Lookback::years(1)),
            ),
            criterion(
                "Flexible Sigmoidoscopy Performed",
                vs("Flexible Sigmoidoscopy", "2.16.840.1.113883.3.464.1003.198.12.1010"),
                ClinicalType::Procedure,
                Some(Lookback::years(5)),
            ),
            criterion(
                "Stool DNA with FIT Test Performed",
                vs("sDNA FIT Test", "2.16.840.1.113883.3.464.1003.108.12.1039"),
                ClinicalType::Observation,
                Some(Lookback::years(3)),
            ),
            criterion(
                "CT Colonography Performed",
                vs("CT Colonography", "2.16.840.1.113883.3.464.1003.108.12.1038"),
                ClinicalType::Procedure,
                Some(Lookback::years(5)),
            ),
        ],
        exclusions: &[
            criterion(
                "Malignant Neoplasm of Colon Diagnosis",
                vs("Malignant Neoplasm of Colon", "2.16.840.1.113883.3.464.1003.108.12.1001"),
                ClinicalType::Diagnosis,
                None,
            ),
            criterion(
                "Total Colectomy Performed",
                vs("Total Colectomy", "2.16.840.1.113883.3.464.1003.198.12.1019"),
                ClinicalType::Procedure,
                None,
            ),
        ],
    },
    FamilyProfile {
        family: MeasureFamily::CervicalScreening,
        measure_ids: &["CMS124"],
        title_keywords: &["cervical cancer", "cervical screening"],
        age_min: 24,
        age_max: 64,
        gender: Some("female"),
        numerator: &[
            criterion(
                "Cervical Cytology Within 3 Years",
                vs("Pap Test", "2.16.840.1.113883.3.464.1003.108.12.1017"),
                ClinicalType::Observation,
                Some(Lookback::years(3)),
            ),
            criterion(
                "HPV Test Within 5 Years",
                vs("HPV Test", "2.16.840.1.113883.3.464.1003.110.12.1059"),
                ClinicalType::Observation,
                Some(Lookback::years(5)),
            ),
        ],
        exclusions: &[criterion(
            "Hysterectomy with No Residual Cervix Performed",
            vs(
                "Hysterectomy with No Residual Cervix",
                "2.16.840.1.113883.3.464.1003.198.12.1014",
            ),
            ClinicalType::Procedure,
            None,
        )],
    },
    FamilyProfile {
        family: MeasureFamily::BreastScreening,
        measure_ids: &["CMS125"],
        title_keywords: &["breast cancer", "mammogra"],
        age_min: 52,
        age_max: 74,
        gender: Some("female"),
        numerator: &[criterion(
            "Mammography Performed",
            vs("Mammography", "2.16.840.1.113883.3.464.1003.108.12.1018"),
            ClinicalType::Observation,
            Some(Lookback::years(2)),
        )],
        exclusions: &[criterion(
            "Bilateral Mastectomy Performed",
            vs("Bilateral Mastectomy", "2.16.840.1.113883.3.464.1003.198.12.1005"),
            ClinicalType::Procedure,
            None,
        )],
    },
];

/// First profile matching the measure id or title
pub fn detect_family(metadata: &MeasureMetadata) -> Option<&'static FamilyProfile> {
    FAMILY_PROFILES.iter().find(|profile| profile.matches(metadata))
}
