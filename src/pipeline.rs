use crate::checkpoint::{resume_page, CheckpointStore};
use crate::crawler::{CrawlContext, DetailCrawler, ListPageCrawler};
use crate::interrupt::InterruptFlag;
use crate::models::JobDetail;
use crate::session::SessionLauncher;
use crate::writer::OutputStore;
use crate::Result;
use std::collections::HashSet;
use tracing::{error, info, warn};

/// Where the run loop currently is. `Done` and `Interrupted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    FetchList,
    FetchDetails,
    Checkpoint,
    Flush,
    Done,
    Interrupted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub first_page: u32,
    pub pages_completed: u32,
    pub details_collected: usize,
    pub rows_in_table: usize,
    pub interrupted: bool,
}

pub struct CrawlPipeline<C, L: SessionLauncher> {
    client: C,
    ctx: CrawlContext<L>,
    checkpoint: CheckpointStore,
    output: OutputStore,
    existing_ids: HashSet<String>,
    interrupt: InterruptFlag,
    buffer: Vec<JobDetail>,
    stage: RunStage,
}

impl<C, L> CrawlPipeline<C, L>
where
    C: ListPageCrawler + DetailCrawler,
    L: SessionLauncher,
{
    pub fn new(
        client: C,
        ctx: CrawlContext<L>,
        checkpoint: CheckpointStore,
        output: OutputStore,
    ) -> Self {
        Self {
            client,
            ctx,
            checkpoint,
            output,
            existing_ids: HashSet::new(),
            interrupt: InterruptFlag::new(),
            buffer: Vec::new(),
            stage: RunStage::Init,
        }
    }

    /// Identifiers captured by earlier runs; never modified during this one.
    pub fn with_existing_ids(mut self, ids: HashSet<String>) -> Self {
        self.existing_ids = ids;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn stage(&self) -> RunStage {
        self.stage
    }

    pub fn context(&self) -> &CrawlContext<L> {
        &self.ctx
    }

    /// Crawls from the resume page through `end_page`. Whatever is buffered is
    /// flushed before returning, including when the run fails or is interrupted.
    pub fn run(&mut self, start_page: u32, end_page: u32) -> Result<RunSummary> {
        let first_page = resume_page(self.checkpoint.load(), start_page);
        info!(
            first_page,
            requested_start = start_page,
            end_page,
            known_jobs = self.existing_ids.len(),
            "starting crawl"
        );

        let mut summary = RunSummary {
            first_page,
            ..Default::default()
        };

        self.ctx.sessions.start()?;
        let crawled = self.crawl_pages(first_page, end_page, &mut summary);

        let outcome = match crawled {
            Ok(()) => self.flush(&mut summary).map(|_| summary),
            Err(err) => {
                error!(error = %err, "crawl aborted, saving collected records");
                if let Err(flush_err) = self.flush(&mut summary) {
                    error!(error = %flush_err, "final save failed");
                }
                Err(err)
            }
        };

        self.ctx.sessions.shutdown();
        outcome.inspect(|summary| {
            info!(
                pages = summary.pages_completed,
                details = summary.details_collected,
                rows = summary.rows_in_table,
                interrupted = summary.interrupted,
                "crawl finished"
            );
        })
    }

    fn crawl_pages(&mut self, first_page: u32, end_page: u32, summary: &mut RunSummary) -> Result<()> {
        let flush_every = self.ctx.policy.flush_every.max(1);

        for page in first_page..=end_page {
            if self.observe_interrupt(summary) {
                return Ok(());
            }

            self.stage = RunStage::FetchList;
            let url = self.client.build_page_url(page);
            info!(page, %url, "crawling listing page");
            let jobs = self
                .client
                .harvest_page(&mut self.ctx, &url, &self.existing_ids)?;

            self.stage = RunStage::FetchDetails;
            for job in &jobs {
                if self.observe_interrupt(summary) {
                    return Ok(());
                }
                if let Some(detail) = self.client.fetch_detail(&mut self.ctx, job)? {
                    self.buffer.push(detail);
                    summary.details_collected += 1;
                    info!(
                        job_id = %job.job_id,
                        total = summary.details_collected,
                        "collected job detail"
                    );
                }
                self.ctx.sessions.record_detail_processed()?;
            }

            self.stage = RunStage::Checkpoint;
            if let Err(err) = self.checkpoint.save(page) {
                warn!(page, error = %err, "could not save checkpoint");
            }
            summary.pages_completed += 1;
            info!(page, collected = jobs.len(), "page complete");

            if page % flush_every == 0 || page == end_page {
                self.flush(summary)?;
            }

            if page < end_page && !self.interrupt.is_raised() {
                self.ctx.policy.page_delay.pause();
            }
        }

        if !self.observe_interrupt(summary) {
            self.stage = RunStage::Done;
        }
        Ok(())
    }

    fn observe_interrupt(&mut self, summary: &mut RunSummary) -> bool {
        if self.interrupt.is_raised() {
            self.stage = RunStage::Interrupted;
            summary.interrupted = true;
            true
        } else {
            false
        }
    }

    fn flush(&mut self, summary: &mut RunSummary) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let resume_stage = self.stage;
        self.stage = RunStage::Flush;
        let rows = self.output.persist(&self.buffer)?;
        info!(batch = self.buffer.len(), rows, "flushed records");
        self.buffer.clear();
        summary.rows_in_table = rows;
        self.stage = resume_stage;
        Ok(())
    }
}
