use serde::{Deserialize, Serialize};

/// Placeholder for list-page fields that could not be located.
pub const NOT_AVAILABLE: &str = "N/A";
/// Placeholder for detail-page fields that could not be located.
pub const UNKNOWN: &str = "未知";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalaryInfo {
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub salary_avg: Option<f64>,
    pub salary_note: String,
}

/// One entry harvested from a search-results page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    pub industry: String,
    pub location: String,
    pub experience: String,
    pub education: String,
    pub salary: String,
    #[serde(flatten)]
    pub salary_info: SalaryInfo,
    pub tags: Vec<String>,
    pub update_date: String,
    pub source_url: String,
}

impl JobSummary {
    pub fn new(job_id: impl Into<String>, job_title: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job_title: job_title.into(),
            company: NOT_AVAILABLE.to_string(),
            industry: NOT_AVAILABLE.to_string(),
            location: NOT_AVAILABLE.to_string(),
            experience: NOT_AVAILABLE.to_string(),
            education: NOT_AVAILABLE.to_string(),
            salary: NOT_AVAILABLE.to_string(),
            salary_info: SalaryInfo::default(),
            tags: Vec::new(),
            update_date: NOT_AVAILABLE.to_string(),
            source_url: String::new(),
        }
    }
}

/// A summary merged with everything read from the posting's detail page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub job_description: String,
    pub skills: Vec<String>,
    pub job_categories: Vec<String>,
    pub management_responsibility: String,
    pub work_shift: String,
    pub remote_work: String,
    #[serde(rename = "BT_EXP")]
    pub business_travel: String,
    pub languages: String,
    pub tools: Vec<String>,
    pub work_skills: Vec<String>,
    pub other_conditions: String,
}

impl JobDetail {
    pub fn job_id(&self) -> &str {
        &self.summary.job_id
    }
}
