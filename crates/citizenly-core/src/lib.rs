//! Core domain model and sectoral classification rules for Citizenly.
//!
//! Everything in this crate is pure: classification reads a resident's
//! attributes and a reference date, and never touches a clock, a database,
//! or the network. Bad data (future birthdates, unknown enum strings) makes
//! a predicate return `false`, never panic.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

pub const CRATE_NAME: &str = "citizenly-core";

/// Oldest age treated as plausible for a living resident. Anything beyond
/// this is assumed to be a data-entry error and classifies as nothing.
pub const MAX_PLAUSIBLE_AGE_YEARS: i32 = 130;

/// Inclusive age band for the out-of-school-children sector.
pub const OUT_OF_SCHOOL_CHILDREN_AGES: (i32, i32) = (6, 14);

/// Inclusive age band for the out-of-school-youth sector.
pub const OUT_OF_SCHOOL_YOUTH_AGES: (i32, i32) = (15, 24);

/// First birthday that makes a resident a senior citizen.
pub const SENIOR_CITIZEN_MIN_AGE: i32 = 60;

/// Highest schooling level a resident has reached, whether or not they
/// finished it. Stored as snake_case text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EducationAttainment {
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    NoSchooling,
    Elementary,
    HighSchool,
    Vocational,
    College,
    PostGraduate,
}

impl EducationAttainment {
    /// Whether this level sits beyond secondary school.
    pub fn is_post_secondary(self) -> bool {
        matches!(
            self,
            EducationAttainment::Vocational
                | EducationAttainment::College
                | EducationAttainment::PostGraduate
        )
    }
}

/// Whether the resident finished the attainment level they reached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EducationStatus {
    Graduate,
    UnderGraduate,
}

/// Self-reported employment situation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    Unemployed,
    LookingForWork,
    Student,
    Retired,
    Homemaker,
    UnableToWork,
    NotInLaborForce,
    Underemployed,
}

/// Canonical persisted resident row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub barangay_code: String,
    pub birthdate: NaiveDate,
    pub education_attainment: Option<EducationAttainment>,
    pub education_status: Option<EducationStatus>,
    pub employment_status: Option<EmploymentStatus>,
    pub ethnicity: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resident {
    /// The subset of attributes the classification rules read.
    pub fn profile(&self) -> ResidentProfile {
        ResidentProfile {
            birthdate: self.birthdate,
            education_attainment: self.education_attainment,
            education_status: self.education_status,
            employment_status: self.employment_status,
            ethnicity: self.ethnicity.clone(),
        }
    }
}

/// Rule-engine input: the attributes classification depends on, detached
/// from identity and bookkeeping columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidentProfile {
    pub birthdate: NaiveDate,
    pub education_attainment: Option<EducationAttainment>,
    pub education_status: Option<EducationStatus>,
    pub employment_status: Option<EmploymentStatus>,
    pub ethnicity: Option<String>,
}

/// One-to-one companion row to a resident carrying sector membership flags.
///
/// The first six flags are derived from the resident's attributes and are
/// owned by the synchronizer; operator-submitted values for them are
/// overwritten on every write. The remaining five are operator-asserted and
/// survive recomputation, except `is_registered_senior_citizen`, which is
/// cleared whenever `is_senior_citizen` turns false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectoralRecord {
    pub resident_id: Uuid,
    pub is_out_of_school_children: bool,
    pub is_out_of_school_youth: bool,
    pub is_senior_citizen: bool,
    pub is_labor_force_employed: bool,
    pub is_unemployed: bool,
    pub is_indigenous_people: bool,
    pub is_registered_senior_citizen: bool,
    pub is_person_with_disability: bool,
    pub is_overseas_filipino_worker: bool,
    pub is_solo_parent: bool,
    pub is_migrant: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SectoralRecord {
    /// Fresh all-false row for a resident, timestamped at `now`.
    pub fn new(resident_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            resident_id,
            is_out_of_school_children: false,
            is_out_of_school_youth: false,
            is_senior_citizen: false,
            is_labor_force_employed: false,
            is_unemployed: false,
            is_indigenous_people: false,
            is_registered_senior_citizen: false,
            is_person_with_disability: false,
            is_overseas_filipino_worker: false,
            is_solo_parent: false,
            is_migrant: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Timestamp-insensitive comparison of all eleven membership flags.
    pub fn flags_equal(&self, other: &Self) -> bool {
        self.is_out_of_school_children == other.is_out_of_school_children
            && self.is_out_of_school_youth == other.is_out_of_school_youth
            && self.is_senior_citizen == other.is_senior_citizen
            && self.is_labor_force_employed == other.is_labor_force_employed
            && self.is_unemployed == other.is_unemployed
            && self.is_indigenous_people == other.is_indigenous_people
            && self.is_registered_senior_citizen == other.is_registered_senior_citizen
            && self.is_person_with_disability == other.is_person_with_disability
            && self.is_overseas_filipino_worker == other.is_overseas_filipino_worker
            && self.is_solo_parent == other.is_solo_parent
            && self.is_migrant == other.is_migrant
    }
}

/// Operator-writable portion of a sectoral row.
///
/// Derived flags are deliberately absent: anything else submitted alongside
/// these is discarded and recomputed. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectoralWrite {
    pub is_registered_senior_citizen: Option<bool>,
    pub is_person_with_disability: Option<bool>,
    pub is_overseas_filipino_worker: Option<bool>,
    pub is_solo_parent: Option<bool>,
    pub is_migrant: Option<bool>,
}

impl SectoralWrite {
    pub fn apply_to(&self, record: &mut SectoralRecord) {
        if let Some(v) = self.is_registered_senior_citizen {
            record.is_registered_senior_citizen = v;
        }
        if let Some(v) = self.is_person_with_disability {
            record.is_person_with_disability = v;
        }
        if let Some(v) = self.is_overseas_filipino_worker {
            record.is_overseas_filipino_worker = v;
        }
        if let Some(v) = self.is_solo_parent {
            record.is_solo_parent = v;
        }
        if let Some(v) = self.is_migrant {
            record.is_migrant = v;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_registered_senior_citizen.is_none()
            && self.is_person_with_disability.is_none()
            && self.is_overseas_filipino_worker.is_none()
            && self.is_solo_parent.is_none()
            && self.is_migrant.is_none()
    }
}

/// Whole years completed between `birthdate` and `as_of`, counting a year
/// only once the birthday has passed. Feb 29 birthdates complete a year on
/// Mar 1 in common years.
///
/// Returns `None` for birthdates after `as_of` and for spans beyond
/// [`MAX_PLAUSIBLE_AGE_YEARS`]; callers treat `None` as "qualifies for no
/// age-based sector".
pub fn calculate_age(birthdate: NaiveDate, as_of: NaiveDate) -> Option<i32> {
    if birthdate > as_of {
        return None;
    }
    let mut years = as_of.year() - birthdate.year();
    if as_of.month() < birthdate.month()
        || (as_of.month() == birthdate.month() && as_of.day() < birthdate.day())
    {
        years -= 1;
    }
    if years > MAX_PLAUSIBLE_AGE_YEARS {
        return None;
    }
    Some(years)
}

/// Inclusive-on-both-ends band check.
pub fn age_in_range(age: i32, low: i32, high: i32) -> bool {
    age >= low && age <= high
}

/// Out-of-school children: aged 6-14, reached elementary or high school,
/// and did not finish it.
pub fn is_out_of_school_children(
    age: Option<i32>,
    attainment: Option<EducationAttainment>,
    status: Option<EducationStatus>,
) -> bool {
    let Some(age) = age else {
        return false;
    };
    let (low, high) = OUT_OF_SCHOOL_CHILDREN_AGES;
    if !age_in_range(age, low, high) {
        return false;
    }
    matches!(
        attainment,
        Some(EducationAttainment::Elementary | EducationAttainment::HighSchool)
    ) && status == Some(EducationStatus::UnderGraduate)
}

/// Out-of-school youth: aged 15-24, not working, and without a completed
/// post-secondary education.
///
/// A missing attainment counts as "no post-secondary education" and so
/// satisfies the education arm; a post-secondary attainment qualifies only
/// when the recorded status says it was left unfinished.
pub fn is_out_of_school_youth(
    age: Option<i32>,
    attainment: Option<EducationAttainment>,
    status: Option<EducationStatus>,
    employment: Option<EmploymentStatus>,
) -> bool {
    let Some(age) = age else {
        return false;
    };
    let (low, high) = OUT_OF_SCHOOL_YOUTH_AGES;
    if !age_in_range(age, low, high) {
        return false;
    }
    if is_employed(employment) {
        return false;
    }
    match attainment {
        None => true,
        Some(level) if !level.is_post_secondary() => true,
        Some(_) => status == Some(EducationStatus::UnderGraduate),
    }
}

/// Senior citizens have completed at least sixty years.
pub fn is_senior_citizen(age: Option<i32>) -> bool {
    age.is_some_and(|a| a >= SENIOR_CITIZEN_MIN_AGE)
}

/// Wage-employed or self-employed counts as in the employed labor force.
pub fn is_employed(employment: Option<EmploymentStatus>) -> bool {
    matches!(
        employment,
        Some(EmploymentStatus::Employed | EmploymentStatus::SelfEmployed)
    )
}

/// Unemployed or actively looking for work. Statuses outside the labor
/// force (student, retired, homemaker, unable to work) are neither employed
/// nor unemployed.
pub fn is_unemployed(employment: Option<EmploymentStatus>) -> bool {
    matches!(
        employment,
        Some(EmploymentStatus::Unemployed | EmploymentStatus::LookingForWork)
    )
}

/// Membership in a recognized indigenous cultural community, by ethnicity
/// match against the configured allow-list.
pub fn is_indigenous_people(ethnicity: Option<&str>, groups: &IndigenousGroups) -> bool {
    ethnicity.is_some_and(|e| groups.contains(e))
}

/// Lowercases, strips punctuation, and collapses whitespace so that
/// spelling variants of the same group name ("B'laan", "blaan", "B laan")
/// compare equal.
pub fn normalize_ethnicity(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .concat()
}

/// Built-in allow-list of indigenous cultural communities and ethnic groups
/// recognized for the indigenous-people sector. Deployments can replace it
/// from configuration.
pub const DEFAULT_INDIGENOUS_GROUPS: &[&str] = &[
    "Aeta",
    "Agta",
    "Ati",
    "Badjao",
    "B'laan",
    "Bontok",
    "Bukidnon",
    "Gaddang",
    "Higaonon",
    "Ibaloi",
    "Ifugao",
    "Igorot",
    "Ilongot",
    "Isneg",
    "Itneg",
    "Ivatan",
    "Kalinga",
    "Kankanaey",
    "Lumad",
    "Maguindanao",
    "Mamanwa",
    "Mandaya",
    "Mangyan",
    "Manobo",
    "Mansaka",
    "Maranao",
    "Palaw'an",
    "Sama",
    "Subanen",
    "T'boli",
    "Tagbanwa",
    "Tausug",
    "Teduray",
    "Tumandok",
    "Yakan",
];

/// Normalized ethnicity allow-list backing [`is_indigenous_people`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndigenousGroups {
    normalized: BTreeSet<String>,
}

impl Default for IndigenousGroups {
    fn default() -> Self {
        Self::from_names(DEFAULT_INDIGENOUS_GROUPS.iter().copied())
    }
}

impl IndigenousGroups {
    /// Builds an allow-list from raw names; entries that normalize to the
    /// empty string are dropped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = names
            .into_iter()
            .map(|n| normalize_ethnicity(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        Self { normalized }
    }

    pub fn contains(&self, ethnicity: &str) -> bool {
        let key = normalize_ethnicity(ethnicity);
        !key.is_empty() && self.normalized.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Per-barangay sector membership totals, the read model behind summary
/// endpoints and report snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarangaySectoralCounts {
    pub barangay_code: String,
    pub residents: i64,
    pub out_of_school_children: i64,
    pub out_of_school_youth: i64,
    pub senior_citizens: i64,
    pub labor_force_employed: i64,
    pub unemployed: i64,
    pub indigenous_people: i64,
    pub registered_senior_citizens: i64,
    pub persons_with_disability: i64,
    pub overseas_filipino_workers: i64,
    pub solo_parents: i64,
    pub migrants: i64,
}

impl BarangaySectoralCounts {
    /// Zeroed totals for one barangay.
    pub fn new(barangay_code: impl Into<String>) -> Self {
        Self {
            barangay_code: barangay_code.into(),
            residents: 0,
            out_of_school_children: 0,
            out_of_school_youth: 0,
            senior_citizens: 0,
            labor_force_employed: 0,
            unemployed: 0,
            indigenous_people: 0,
            registered_senior_citizens: 0,
            persons_with_disability: 0,
            overseas_filipino_workers: 0,
            solo_parents: 0,
            migrants: 0,
        }
    }

    /// Folds one resident's flags into the totals.
    pub fn absorb(&mut self, record: &SectoralRecord) {
        self.residents += 1;
        self.out_of_school_children += i64::from(record.is_out_of_school_children);
        self.out_of_school_youth += i64::from(record.is_out_of_school_youth);
        self.senior_citizens += i64::from(record.is_senior_citizen);
        self.labor_force_employed += i64::from(record.is_labor_force_employed);
        self.unemployed += i64::from(record.is_unemployed);
        self.indigenous_people += i64::from(record.is_indigenous_people);
        self.registered_senior_citizens += i64::from(record.is_registered_senior_citizen);
        self.persons_with_disability += i64::from(record.is_person_with_disability);
        self.overseas_filipino_workers += i64::from(record.is_overseas_filipino_worker);
        self.solo_parents += i64::from(record.is_solo_parent);
        self.migrants += i64::from(record.is_migrant);
    }
}

/// Freshly derived values for the six auto-calculated flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoFlags {
    pub out_of_school_children: bool,
    pub out_of_school_youth: bool,
    pub senior_citizen: bool,
    pub labor_force_employed: bool,
    pub unemployed: bool,
    pub indigenous_people: bool,
}

/// Runs every membership rule against one profile as of a reference date.
pub fn evaluate_auto_flags(
    profile: &ResidentProfile,
    groups: &IndigenousGroups,
    as_of: NaiveDate,
) -> AutoFlags {
    let age = calculate_age(profile.birthdate, as_of);
    AutoFlags {
        out_of_school_children: is_out_of_school_children(
            age,
            profile.education_attainment,
            profile.education_status,
        ),
        out_of_school_youth: is_out_of_school_youth(
            age,
            profile.education_attainment,
            profile.education_status,
            profile.employment_status,
        ),
        senior_citizen: is_senior_citizen(age),
        labor_force_employed: is_employed(profile.employment_status),
        unemployed: is_unemployed(profile.employment_status),
        indigenous_people: is_indigenous_people(profile.ethnicity.as_deref(), groups),
    }
}

/// Result of one synchronizer pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub record: SectoralRecord,
    /// True when any membership flag differs from `current`; `updated_at`
    /// was bumped to `now` only in that case.
    pub changed: bool,
}

/// Reconciles a sectoral row against the resident it belongs to.
///
/// Derived flags are overwritten with freshly computed values regardless of
/// what `current` carries; manual flags pass through untouched, except that
/// the registered-senior flag is cleared when the resident stops being a
/// senior citizen. When nothing differs, the returned row is identical to
/// `current`, timestamps included, so repeat runs are no-ops.
pub fn synchronize(
    current: &SectoralRecord,
    profile: &ResidentProfile,
    groups: &IndigenousGroups,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> SyncOutcome {
    let auto = evaluate_auto_flags(profile, groups, as_of);
    let mut next = current.clone();
    next.is_out_of_school_children = auto.out_of_school_children;
    next.is_out_of_school_youth = auto.out_of_school_youth;
    next.is_senior_citizen = auto.senior_citizen;
    next.is_labor_force_employed = auto.labor_force_employed;
    next.is_unemployed = auto.unemployed;
    next.is_indigenous_people = auto.indigenous_people;
    if !next.is_senior_citizen {
        next.is_registered_senior_citizen = false;
    }
    let changed = !next.flags_equal(current);
    if changed {
        next.updated_at = now;
    }
    SyncOutcome {
        record: next,
        changed,
    }
}
