use crate::models::{JobDetail, JobSummary, SalaryInfo};
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{info, warn};

/// Separator used when list-valued fields are flattened into one CSV cell.
pub const LIST_DELIMITER: char = ',';
const BOM: &str = "\u{feff}";

static JOBCAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"jobcat=(\w+)").unwrap());

/// Flat CSV form of a [`JobDetail`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CsvRow {
    job_id: String,
    job_title: String,
    company: String,
    industry: String,
    location: String,
    experience: String,
    education: String,
    salary: String,
    #[serde(deserialize_with = "integral_cell")]
    salary_min: Option<i64>,
    #[serde(deserialize_with = "integral_cell")]
    salary_max: Option<i64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    salary_avg: Option<f64>,
    salary_note: String,
    tags: String,
    update_date: String,
    source_url: String,
    job_description: String,
    skills: String,
    job_categories: String,
    management_responsibility: String,
    work_shift: String,
    remote_work: String,
    #[serde(rename = "BT_EXP")]
    business_travel: String,
    languages: String,
    tools: String,
    work_skills: String,
    other_conditions: String,
}

/// Whole-number cell that may have been written in float form (`40000.0`).
/// Empty, fractional or non-numeric cells read as `None`.
fn integral_cell<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let cell = Option::<String>::deserialize(deserializer)?;
    Ok(cell.as_deref().map(str::trim).and_then(|cell| {
        cell.parse::<i64>().ok().or_else(|| {
            cell.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && value.fract() == 0.0)
                .filter(|value| value.abs() < i64::MAX as f64)
                .map(|value| value as i64)
        })
    }))
}

fn join_list(values: &[String]) -> String {
    values.join(&LIST_DELIMITER.to_string())
}

fn split_list(cell: &str) -> Vec<String> {
    cell.split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

impl CsvRow {
    fn from_job(job: &JobDetail) -> Self {
        let summary = &job.summary;
        Self {
            job_id: summary.job_id.clone(),
            job_title: summary.job_title.clone(),
            company: summary.company.clone(),
            industry: summary.industry.clone(),
            location: summary.location.clone(),
            experience: summary.experience.clone(),
            education: summary.education.clone(),
            salary: summary.salary.clone(),
            salary_min: summary.salary_info.salary_min,
            salary_max: summary.salary_info.salary_max,
            salary_avg: summary.salary_info.salary_avg,
            salary_note: summary.salary_info.salary_note.clone(),
            tags: join_list(&summary.tags),
            update_date: summary.update_date.clone(),
            source_url: summary.source_url.clone(),
            job_description: job.job_description.clone(),
            skills: join_list(&job.skills),
            job_categories: join_list(&job.job_categories),
            management_responsibility: job.management_responsibility.clone(),
            work_shift: job.work_shift.clone(),
            remote_work: job.remote_work.clone(),
            business_travel: job.business_travel.clone(),
            languages: job.languages.clone(),
            tools: join_list(&job.tools),
            work_skills: join_list(&job.work_skills),
            other_conditions: job.other_conditions.clone(),
        }
    }

    fn into_job(self) -> JobDetail {
        JobDetail {
            summary: JobSummary {
                job_id: self.job_id,
                job_title: self.job_title,
                company: self.company,
                industry: self.industry,
                location: self.location,
                experience: self.experience,
                education: self.education,
                salary: self.salary,
                salary_info: SalaryInfo {
                    salary_min: self.salary_min,
                    salary_max: self.salary_max,
                    salary_avg: self.salary_avg,
                    salary_note: self.salary_note,
                },
                tags: split_list(&self.tags),
                update_date: self.update_date,
                source_url: self.source_url,
            },
            job_description: self.job_description,
            skills: split_list(&self.skills),
            job_categories: split_list(&self.job_categories),
            management_responsibility: self.management_responsibility,
            work_shift: self.work_shift,
            remote_work: self.remote_work,
            business_travel: self.business_travel,
            languages: self.languages,
            tools: split_list(&self.tools),
            work_skills: split_list(&self.work_skills),
            other_conditions: self.other_conditions,
        }
    }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::io::Cursor<Vec<u8>>>> {
    let raw = std::fs::read_to_string(path)?;
    let body = raw.strip_prefix(BOM).unwrap_or(&raw).as_bytes().to_vec();
    Ok(csv::Reader::from_reader(std::io::Cursor::new(body)))
}

/// Identifiers in a previously written table. A missing or unreadable table
/// yields an empty set so the run still proceeds.
pub fn load_existing_ids(path: &Path) -> HashSet<String> {
    if !path.exists() {
        info!(path = %path.display(), "no existing table, every job is new");
        return HashSet::new();
    }

    let collect = || -> Result<HashSet<String>> {
        let mut reader = csv_reader(path)?;
        let Some(column) = reader.headers()?.iter().position(|name| name == "job_id") else {
            return Ok(HashSet::new());
        };
        let mut ids = HashSet::new();
        for record in reader.records() {
            if let Some(id) = record?.get(column).map(str::trim).filter(|id| !id.is_empty()) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    };

    match collect() {
        Ok(ids) => {
            info!(path = %path.display(), count = ids.len(), "loaded existing job ids");
            ids
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read existing table");
            HashSet::new()
        }
    }
}

pub fn read_table(path: &Path) -> Result<Vec<JobDetail>> {
    let mut reader = csv_reader(path)?;
    reader
        .deserialize::<CsvRow>()
        .map(|row| row.map(CsvRow::into_job).map_err(Into::into))
        .collect()
}

pub fn read_json_table(path: &Path) -> Result<Vec<JobDetail>> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

/// Concatenates `existing` and `batch`, keeping the first row seen for each id.
pub fn merge_unique(existing: Vec<JobDetail>, batch: &[JobDetail]) -> Vec<JobDetail> {
    let mut seen = HashSet::new();
    existing
        .into_iter()
        .chain(batch.iter().cloned())
        .filter(|job| seen.insert(job.job_id().to_string()))
        .collect()
}

pub fn save_to_csv(jobs: &[JobDetail], file_path: &Path) -> Result<()> {
    let mut file = File::create(file_path)?;
    file.write_all(BOM.as_bytes())?;
    let mut writer = csv::Writer::from_writer(file);

    for job in jobs {
        writer.serialize(CsvRow::from_job(job))?;
    }

    writer.flush()?;
    Ok(())
}

pub fn save_to_json(jobs: &[JobDetail], file_path: &Path) -> Result<()> {
    let file = File::create(file_path)?;
    serde_json::to_writer_pretty(file, jobs)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub csv: PathBuf,
    pub json: PathBuf,
}

impl OutputPaths {
    /// `job_data.csv` with `jobcat=2007001022` becomes `job_data_jobcat_1022.csv`.
    pub fn for_query(output_csv: &str, query_params: &str) -> Self {
        let jobcat = JOBCAT
            .captures(query_params)
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str());
        let short: String = match jobcat {
            Some(jobcat) => {
                let chars: Vec<char> = jobcat.chars().collect();
                chars[chars.len().saturating_sub(4)..].iter().collect()
            }
            None => "unknown".to_string(),
        };
        let stem = output_csv.strip_suffix(".csv").unwrap_or(output_csv);

        Self {
            csv: PathBuf::from(format!("{stem}_jobcat_{short}.csv")),
            json: PathBuf::from(format!("{stem}_jobcat_{short}.json")),
        }
    }
}

/// Deduplicating writer for the run's output table.
#[derive(Debug, Clone)]
pub struct OutputStore {
    paths: OutputPaths,
}

impl OutputStore {
    pub fn new(paths: OutputPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// Merges `batch` into the table on disk and rewrites both serializations.
    /// Returns the number of rows in the table afterwards.
    pub fn persist(&self, batch: &[JobDetail]) -> Result<usize> {
        if batch.is_empty() {
            info!("no job records to persist");
            return Ok(0);
        }

        let existing = self.previous_table()?;
        let merged = merge_unique(existing, batch);

        save_to_csv(&merged, &self.paths.csv)?;
        info!(path = %self.paths.csv.display(), rows = merged.len(), "saved csv");
        save_to_json(&merged, &self.paths.json)?;
        info!(path = %self.paths.json.display(), rows = merged.len(), "saved json");

        Ok(merged.len())
    }

    /// The JSON copy keeps list fields intact, so it is preferred over the CSV
    /// whenever it parses.
    fn previous_table(&self) -> Result<Vec<JobDetail>> {
        if self.paths.json.exists() {
            match read_json_table(&self.paths.json) {
                Ok(table) => return Ok(table),
                Err(e) => warn!(
                    path = %self.paths.json.display(),
                    error = %e,
                    "previous json unreadable, merging from csv"
                ),
            }
        }
        if self.paths.csv.exists() {
            read_table(&self.paths.csv)
        } else {
            Ok(Vec::new())
        }
    }
}
