use crate::crawler::{element_text, DetailCrawler, ListPageCrawler};
use crate::models::{JobDetail, JobSummary, NOT_AVAILABLE, UNKNOWN};
use crate::salary::parse_salary;
use crate::session::Locator;
use crate::skills::extract_skills;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::warn;

const LISTING_CARD: &str = "div.info-container";
const LISTING_DATE: &str = "div.date-container";
const TITLE_LINK: &str = r#"h2 a[data-gtm-joblist="職缺-職缺名稱"]"#;
const COMPANY: &str = r#"a[data-gtm-joblist="職缺-公司名稱"]"#;
const INDUSTRY: &str = r#"span[data-gtm-joblist*="職缺-產業"] a"#;
const LOCATION: &str = r#"div.info-tags a[data-gtm-joblist*="職缺-地區"]"#;
const EXPERIENCE: &str = r#"div.info-tags a[data-gtm-joblist*="職缺-經歷"]"#;
const EDUCATION: &str = r#"div.info-tags a[data-gtm-joblist*="職缺-學歷"]"#;
const SALARY: &str = r#"div.info-tags a[data-gtm-joblist*="職缺-薪資"]"#;
const OTHER_TAGS: &str = "div.info-othertags a";

const DESCRIPTION_LOCATORS: &[Locator] = &[
    Locator::Css("p.job-description__content"),
    Locator::LabelledSibling {
        heading: "h2",
        label: "工作內容",
        class: "job-description__content",
    },
    Locator::Css("div.job-description__content p"),
];

const DESCRIPTION_ROWS: &str = "div.job-description-table div.list-row";
const REQUIREMENT_ROWS: &str = "div.job-requirement-table div.list-row";
const ROW_TITLE: &str = "h3.h3";
const ROW_VALUE: &str = "div.t3.mb-0";
const OTHER_CONDITIONS: &str = "div.job-requirement-table__data p.r3";
const CATEGORIES: &str = "div.category-item div.v-popper u";

const NOT_REQUIRED: &str = "不拘";
const NONE_LISTED: &str = "無";
const NO_TOOLS: &str = "--";

static JOB_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/job/(\w+)").unwrap());

#[derive(Debug, Clone)]
pub struct Job104CrawlConfig {
    /// Search page without query string.
    pub base_url: String,
    /// Query string without the leading `?`, e.g. `jobcat=2007001022`.
    pub query_params: String,
    /// Pagination parameter with a `{page}` placeholder.
    pub pagination: String,
}

impl Default for Job104CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.104.com.tw/jobs/search".to_string(),
            query_params: "jobcat=2007001022".to_string(),
            pagination: "page={page}".to_string(),
        }
    }
}

pub struct Job104Client {
    detail_base_url: String,
    config: Job104CrawlConfig,
}

impl Job104Client {
    pub fn new(config: Job104CrawlConfig) -> Self {
        Self {
            detail_base_url: "https://www.104.com.tw/job".to_string(),
            config,
        }
    }

    pub fn config(&self) -> &Job104CrawlConfig {
        &self.config
    }

    fn first_text(&self, card: ElementRef, css: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        let text = card.select(&selector).next().map(element_text)?;
        (!text.is_empty()).then_some(text)
    }

    fn extract_title_link(&self, card: ElementRef) -> Option<(String, String)> {
        let selector = Selector::parse(TITLE_LINK).ok()?;
        let link = card.select(&selector).next()?;
        let href = link.value().attr("href")?.to_string();
        Some((element_text(link), href))
    }

    fn extract_tags(&self, card: ElementRef) -> Vec<String> {
        let Ok(selector) = Selector::parse(OTHER_TAGS) else {
            return Vec::new();
        };
        card.select(&selector)
            .map(element_text)
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    /// Value cell of the labelled row in the job description table.
    fn extract_field_value(&self, document: &Html, label: &str) -> Option<String> {
        let rows = Selector::parse(DESCRIPTION_ROWS).ok()?;
        let title = Selector::parse(ROW_TITLE).ok()?;
        let value = Selector::parse(ROW_VALUE).ok()?;

        document
            .select(&rows)
            .filter(|row| {
                row.select(&title)
                    .next()
                    .is_some_and(|t| element_text(t).contains(label))
            })
            .find_map(|row| row.select(&value).next().map(element_text))
    }

    fn extract_languages(&self, document: &Html) -> Option<String> {
        let rows = Selector::parse(REQUIREMENT_ROWS).ok()?;
        let title = Selector::parse(ROW_TITLE).ok()?;
        let underline = Selector::parse("u").ok()?;

        document
            .select(&rows)
            .filter(|row| {
                row.select(&title)
                    .next()
                    .is_some_and(|t| element_text(t).contains("語文條件"))
            })
            .find_map(|row| row.select(&underline).next().map(element_text))
            .filter(|text| !text.is_empty())
    }

    /// The "other conditions" paragraph lives either inside the labelled row or
    /// in the data cell that follows the row heading.
    fn extract_other_conditions(&self, document: &Html) -> Option<String> {
        let rows = Selector::parse("div.list-row").ok()?;
        let title = Selector::parse(ROW_TITLE).ok()?;
        let data = Selector::parse(OTHER_CONDITIONS).ok()?;

        document
            .select(&rows)
            .filter(|row| {
                row.select(&title)
                    .next()
                    .is_some_and(|t| element_text(t).contains("其他條件"))
            })
            .find_map(|row| {
                row.select(&data).next().or_else(|| {
                    row.next_siblings()
                        .filter_map(ElementRef::wrap)
                        .find_map(|sibling| sibling.select(&data).next())
                })
            })
            .map(element_text)
            .filter(|text| !text.is_empty())
    }

    fn extract_categories(&self, document: &Html) -> Vec<String> {
        let Ok(selector) = Selector::parse(CATEGORIES) else {
            return Vec::new();
        };
        document
            .select(&selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect()
    }

    /// Labels of `<a class="{class}">` links, read from their `<u>` child.
    fn extract_link_labels(&self, document: &Html, css: &str) -> Vec<String> {
        let (Ok(links), Ok(underline)) = (Selector::parse(css), Selector::parse("u")) else {
            return Vec::new();
        };
        document
            .select(&links)
            .filter_map(|link| link.select(&underline).next().map(element_text))
            .collect()
    }
}

impl Default for Job104Client {
    fn default() -> Self {
        Self::new(Job104CrawlConfig::default())
    }
}

pub fn extract_job_id(href: &str) -> Option<String> {
    JOB_ID
        .captures(href)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

fn or_sentinel(values: Vec<String>, sentinel: &str) -> Vec<String> {
    if values.is_empty() {
        vec![sentinel.to_string()]
    } else {
        values
    }
}

impl ListPageCrawler for Job104Client {
    fn build_page_url(&self, page: u32) -> String {
        format!(
            "{}?{}&{}",
            self.config.base_url,
            self.config.query_params,
            self.config.pagination.replace("{page}", &page.to_string())
        )
    }

    fn list_ready_locator(&self) -> Locator {
        Locator::Css(LISTING_CARD)
    }

    fn parse_list_page(&self, html: &str, source_url: &str) -> Vec<JobSummary> {
        let document = Html::parse_document(html);
        let (Ok(card_selector), Ok(date_selector)) =
            (Selector::parse(LISTING_CARD), Selector::parse(LISTING_DATE))
        else {
            return Vec::new();
        };

        // Dates sit outside the cards and line up with them by position.
        let dates: Vec<String> = document.select(&date_selector).map(element_text).collect();
        let text_or_na = |card: ElementRef, css: &str| {
            self.first_text(card, css)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };

        document
            .select(&card_selector)
            .enumerate()
            .filter_map(|(idx, card)| {
                let Some((title, href)) = self.extract_title_link(card) else {
                    warn!(index = idx, "listing entry without a title link");
                    return None;
                };
                let Some(job_id) = extract_job_id(&href) else {
                    warn!(index = idx, %href, "listing entry without a job id");
                    return None;
                };

                let mut job = JobSummary::new(job_id, title);
                job.company = text_or_na(card, COMPANY);
                job.industry = text_or_na(card, INDUSTRY);
                job.location = text_or_na(card, LOCATION);
                job.experience = text_or_na(card, EXPERIENCE);
                job.education = text_or_na(card, EDUCATION);
                job.salary = text_or_na(card, SALARY);
                job.salary_info = parse_salary(&job.salary);
                job.tags = self.extract_tags(card);
                job.update_date = dates.get(idx).cloned().unwrap_or_else(|| {
                    warn!(index = idx, "update date missing for listing entry");
                    NOT_AVAILABLE.to_string()
                });
                job.source_url = source_url.to_string();

                Some(job)
            })
            .collect()
    }
}

impl DetailCrawler for Job104Client {
    fn detail_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.detail_base_url, job_id)
    }

    fn description_locators(&self) -> &[Locator] {
        DESCRIPTION_LOCATORS
    }

    fn parse_detail(&self, html: &str, summary: &JobSummary, description: String) -> JobDetail {
        let document = Html::parse_document(html);

        let other_conditions = self
            .extract_other_conditions(&document)
            .unwrap_or_else(|| NONE_LISTED.to_string());
        let mut skills = extract_skills(&description);
        skills.extend(extract_skills(&other_conditions));

        let field = |label: &str| {
            self.extract_field_value(&document, label)
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        JobDetail {
            summary: summary.clone(),
            job_description: description,
            skills: skills.into_iter().collect(),
            job_categories: or_sentinel(self.extract_categories(&document), UNKNOWN),
            management_responsibility: field("管理責任"),
            work_shift: field("上班時段"),
            remote_work: field("遠端工作"),
            business_travel: field("出差外派"),
            languages: self
                .extract_languages(&document)
                .unwrap_or_else(|| NOT_REQUIRED.to_string()),
            tools: or_sentinel(self.extract_link_labels(&document, "a.tools"), NO_TOOLS),
            work_skills: or_sentinel(self.extract_link_labels(&document, "a.skills"), NOT_REQUIRED),
            other_conditions,
        }
    }
}
