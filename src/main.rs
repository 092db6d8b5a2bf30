use chrono::Local;
use dotenv::dotenv;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{LevelFilter, error, info, warn};

use wuesync::activity_scraper::{resolve_extensions, scrape_section_contents};
use wuesync::{CourseScraper, Mirror, RemoteTree, RuleSet, SectionScraper, SyncContext};

/// Synced when the sync root carries no mask.txt: every course, every file.
const ALLOW_EVERYTHING_MASK: &str = "+ *#";

async fn run_course_discovery_job(ctx: &SyncContext) -> anyhow::Result<RemoteTree> {
    let mut scraper = CourseScraper::new(ctx.urls.courses_page());
    scraper.scrape(&ctx.client, &ctx.ids, &ctx.urls).await?;
    Ok(RemoteTree {
        courses: scraper.courses,
    })
}

/// One course page fetch per course, batched; the rate limiter in the
/// client bounds how hard this hits the portal.
async fn run_section_discovery_job(ctx: &SyncContext, tree: &mut RemoteTree) {
    let mut jobs = FuturesUnordered::new();
    for course in &mut tree.courses {
        jobs.push(async move {
            let mut scraper = SectionScraper::new(course.url.clone());
            match scraper.scrape(&ctx.client, &ctx.ids, &ctx.urls).await {
                Ok(()) => course.sections = scraper.sections,
                Err(e) => warn!("skipping course {}: {e:#}", course.title),
            }
        });
    }
    while jobs.next().await.is_some() {}
}

async fn run_activity_discovery_job(ctx: &SyncContext, tree: &mut RemoteTree) -> anyhow::Result<()> {
    scrape_section_contents(&ctx.client, &ctx.urls, tree).await;
    resolve_extensions(&ctx.client, tree).await
}

fn load_mask(ctx: &SyncContext) -> anyhow::Result<RuleSet> {
    let mask_path = ctx.config.sync_root.join("mask.txt");
    match std::fs::read_to_string(&mask_path) {
        Ok(mask) => RuleSet::parse(&mask),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no mask.txt under the sync root, mirroring everything");
            RuleSet::parse(ALLOW_EVERYTHING_MASK)
        }
        Err(e) => Err(e.into()),
    }
}

async fn run() -> anyhow::Result<()> {
    let ctx = SyncContext::new()?;
    let rules = load_mask(&ctx)?;

    info!("logging in as {}", ctx.config.portal_username);
    ctx.client
        .login(&ctx.urls, &ctx.config.portal_username, &ctx.config.portal_password)
        .await?;

    let mut tree = run_course_discovery_job(&ctx).await?;
    run_section_discovery_job(&ctx, &mut tree).await;
    run_activity_discovery_job(&ctx, &mut tree).await?;

    let report = Mirror::new(&ctx.config, &rules, &ctx.client)
        .sync(&tree)
        .await?;
    info!("sync report: {}", serde_json::to_string(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let start_time = Local::now();
    if let Err(e) = run().await {
        error!("sync failed: {e:#}");
        std::process::exit(1);
    }
    info!(
        "done in {}s",
        Local::now().signed_duration_since(start_time).num_seconds()
    );
}
