use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use poe2_trends::analyzer::{pick_category, summarize, StatColumns};
use poe2_trends::config::{PollerConfig, RunnerConfig, Settings};
use poe2_trends::data::{
    clear_results, get_rates, load_catalog, load_last_stats, load_results, refresh_rates,
    save_last_stats, save_results,
};
use poe2_trends::fetcher::{trade_search_url, BackendClient};
use poe2_trends::jobs::{
    BatchEvent, BatchOutcome, BatchRunner, JobMonitor, MonitorEvent, PollHandle, PollState,
};
use poe2_trends::models::{
    retain_selected, AnalysisRecord, CurrencyRates, GapRecord, Job, NewCustomCategory,
    NewExclusion, StatsReport, StatsRun,
};
use poe2_trends::selection::{CheckState, SelectionTree};
use poe2_trends::storage::{CredentialStore, KeyValueStore, SqliteStore};
use poe2_trends::{Result, TrendsError};

use crate::{
    AnalysesCommand, CategoriesCommand, Cli, Command, ExclusionArgs, ExclusionsCommand,
    HistoryCommand, RatesCommand, ResultsCommand, SettingsCommand, StatsView,
};

struct App {
    settings: Settings,
    client: Arc<BackendClient>,
    store: Arc<dyn KeyValueStore>,
    credentials: CredentialStore,
}

impl App {
    async fn connect(settings: Settings) -> Result<Self> {
        let client = Arc::new(BackendClient::new(&settings.api_url)?);
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteStore::initialize(&settings.database_url).await?);
        let credentials = CredentialStore::new(store.clone());
        Ok(Self {
            settings,
            client,
            store,
            credentials,
        })
    }

    async fn rates(&self) -> CurrencyRates {
        match get_rates(self.store.as_ref()).await {
            Ok(rates) => rates,
            Err(e) => {
                tracing::warn!("Using default currency rates: {}", e);
                CurrencyRates::default()
            }
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let app = App::connect(cli.settings).await?;
    tracing::debug!("Using backend at {}", app.client.base_url());

    match cli.command {
        Command::Settings(command) => settings(&app, command).await,
        Command::Rates(command) => rates(&app, command).await,
        Command::Items { filter } => items(&app, filter.as_deref()).await,
        Command::Job {
            bases,
            categories,
            groups,
            matching,
        } => {
            let bases =
                resolve_selection(&app, bases, &categories, &groups, matching.as_deref()).await?;
            job(&app, bases).await
        }
        Command::Batch { bases, file } => batch(&app, bases, file.as_deref()).await,
        Command::Analyze { base } => analyze(&app, &base).await,
        Command::Distribution { base } => distribution(&app, &base).await,
        Command::Exclusions(command) => exclusions(&app, command).await,
        Command::Categories(command) => categories(&app, command).await,
        Command::Analyses(command) => analyses(&app, command).await,
        Command::Results(command) => results(&app, command).await,
        Command::Stats { query, view } => stats(&app, &query, &view).await,
        Command::History(command) => history(&app, command).await,
        Command::Save { name } => save_stats(&app, &name).await,
    }
}

async fn settings(app: &App, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Set { session_id } => {
            app.credentials.save_session_id(&session_id).await?;
            if session_id.trim().is_empty() {
                println!("POESESSID cleared");
            } else {
                println!("POESESSID saved");
            }
        }
        SettingsCommand::Clear => {
            app.credentials.clear().await?;
            println!("POESESSID cleared");
        }
        SettingsCommand::Show => {
            match app.credentials.session_id().await? {
                Some(id) => {
                    let visible: String = id.chars().take(4).collect();
                    println!("POESESSID: {}****", visible);
                }
                None => println!("POESESSID: not set"),
            }
            println!("Backend:   {}", app.settings.api_url);
            println!("Database:  {}", app.settings.database_url);
            println!("League:    {}", app.settings.league);
        }
    }
    Ok(())
}

async fn rates(app: &App, command: RatesCommand) -> Result<()> {
    let rates = match command {
        RatesCommand::Show => get_rates(app.store.as_ref()).await?,
        RatesCommand::Refresh => refresh_rates(app.client.as_ref(), app.store.as_ref()).await?,
        RatesCommand::Convert { amount, currency } => {
            let rates = app.rates().await;
            println!("{}", rates.format_amount(amount, &currency));
            return Ok(());
        }
    };

    for (currency, rate) in rates.iter() {
        println!("{:<20} {:>12.2} Ex", currency, rate);
    }
    Ok(())
}

async fn build_tree(app: &App) -> Result<SelectionTree> {
    let mut tree = SelectionTree::new(load_catalog(&app.client).await?);
    match app.client.custom_categories().await {
        Ok(groups) => tree.set_custom_groups(groups),
        Err(e) => tracing::warn!("Could not load custom categories: {}", e),
    }
    Ok(tree)
}

async fn items(app: &App, filter: Option<&str>) -> Result<()> {
    let mut tree = build_tree(app).await?;
    if let Some(filter) = filter {
        tree.set_filter(filter);
    }

    for (category, entries) in tree.visible_categories() {
        println!("{} ({})", category, entries.len());
        for entry in entries {
            println!("  {}", entry.name);
        }
    }
    for group in tree.custom_groups() {
        println!("[custom] {} ({}): {}", group.name, group.id, group.items.join(", "));
    }
    Ok(())
}

/// Turns base names plus category and custom group names into a selection.
///
/// `matching` replaces the starting selection with every base the filter shows.
async fn resolve_selection(
    app: &App,
    bases: Vec<String>,
    categories: &[String],
    groups: &[String],
    matching: Option<&str>,
) -> Result<Vec<String>> {
    if categories.is_empty() && groups.is_empty() && matching.is_none() {
        return Ok(bases);
    }

    let mut tree = build_tree(app).await?;
    if let Some(text) = matching {
        tree.set_filter(text);
        tree.select_all();
        tree.set_filter("");
    }
    for unknown in tree.select_names(&bases) {
        tracing::warn!("{} is not in the item catalog", unknown);
    }
    for category in categories {
        if tree.category_state(category) != CheckState::Checked {
            tree.toggle_category(category);
        }
    }
    for group in groups {
        let found = tree
            .custom_groups()
            .iter()
            .find(|g| &g.id == group || g.name.eq_ignore_ascii_case(group))
            .map(|g| g.id.clone());
        match found {
            Some(id) => tree.toggle_custom_group(&id),
            None => tracing::warn!("No custom category named {}", group),
        }
    }
    Ok(tree.selected_names())
}

fn print_monitor_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::Progress {
            progress,
            total,
            current_item,
            ..
        } => match current_item {
            Some(item) => println!("[{}/{}] {}", progress, total, item),
            None => println!("[{}/{}]", progress, total),
        },
        MonitorEvent::InvalidRecords { dropped, .. } => {
            println!("Skipped {} malformed result records", dropped)
        }
        MonitorEvent::Completed { results, .. } => {
            println!("Analysis complete, {} results", results)
        }
        MonitorEvent::Failed { message, .. } => println!("Analysis failed: {}", message),
    }
}

/// Follows a job until it ends or Ctrl-C is pressed.
async fn follow(
    monitor: JobMonitor,
    handle: PollHandle,
    mut events: mpsc::UnboundedReceiver<MonitorEvent>,
) -> (PollState, Option<Job>) {
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_monitor_event(&event);
        }
    });

    let state = tokio::select! {
        state = handle.wait() => state,
        _ = tokio::signal::ctrl_c() => {
            println!("Stopped watching; the server keeps running the job");
            PollState::Cancelled
        }
    };

    let job = monitor.snapshot().job;
    drop(monitor);
    let _ = printer.await;
    (state, job)
}

async fn job(app: &App, selection: Vec<String>) -> Result<()> {
    let (monitor, events) = JobMonitor::new(
        app.client.clone(),
        app.credentials.clone(),
        PollerConfig::default(),
    );

    let handle = monitor.submit_and_watch(&selection).await?;
    println!("Started job {} for {} bases", handle.job_id(), selection.len());

    match follow(monitor, handle, events).await {
        (PollState::Failed(message), _) => Err(TrendsError::JobFailed(message)),
        (state, Some(job)) => {
            if !job.results.is_empty() {
                save_results(app.store.as_ref(), &job.results).await?;
                print_gap_table(app, &job.results).await;
            }
            if state == PollState::Cancelled {
                println!("Job {} is at {}", job.id, job.progress_label());
            }
            Ok(())
        }
        (_, None) => Ok(()),
    }
}

fn read_bases_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        TrendsError::ValidationError(format!("Could not read {}: {}", path.display(), e))
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn print_batch_event(event: &BatchEvent) {
    match event {
        BatchEvent::Started { key, index, total } => {
            println!("[{}/{}] Analyzing {}", index + 1, total, key)
        }
        BatchEvent::Waiting { key, reason, wait } => {
            println!("{:?} on {}, retrying in {}s", reason, key, wait.as_secs())
        }
        BatchEvent::Analyzed(record) => {
            println!("  {}: gap {:.1}c", record.base_type, record.gap_chaos)
        }
        BatchEvent::Failed { key, message } => println!("  {} failed: {}", key, message),
    }
}

async fn batch(app: &App, mut bases: Vec<String>, file: Option<&Path>) -> Result<()> {
    if let Some(file) = file {
        bases.extend(read_bases_file(file)?);
    }
    if bases.is_empty() {
        return Err(TrendsError::EmptySelection);
    }
    let credential = app.credentials.require_session_id().await?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            print_batch_event(&event);
        }
    });

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("Stopping after the current item...");
            trigger.cancel();
        }
    });

    let runner =
        BatchRunner::new(app.client.clone(), RunnerConfig::default()).with_events(events_tx);
    let outcome = runner.run(&bases, &credential, &cancel).await;
    ctrl_c.abort();
    drop(runner);
    let _ = printer.await;

    if let BatchOutcome::Cancelled(report) = &outcome {
        println!("Cancelled after {} of {} bases", report.processed, bases.len());
    }
    let report = outcome.into_report();
    if !report.results.is_empty() {
        save_results(app.store.as_ref(), &report.results).await?;
        print_gap_table(app, &report.results).await;
    }
    for (key, message) in &report.failures {
        println!("Failed: {} ({})", key, message);
    }
    Ok(())
}

async fn analyze(app: &App, base: &str) -> Result<()> {
    let credential = app.credentials.require_session_id().await?;
    let record = app.client.analyze_batch_price(base, &credential).await?;
    save_results(app.store.as_ref(), std::slice::from_ref(&record)).await?;
    print_gap_table(app, std::slice::from_ref(&record)).await;
    Ok(())
}

async fn distribution(app: &App, base: &str) -> Result<()> {
    let job_id = app.client.start_distribution_analysis(base).await?;
    println!("Started distribution analysis {} for {}", job_id, base);

    let (monitor, events) = JobMonitor::new(
        app.client.clone(),
        app.credentials.clone(),
        PollerConfig::default(),
    );
    let handle = monitor.watch(Job::new(job_id, 1));
    match follow(monitor, handle, events).await.0 {
        PollState::Completed => {}
        PollState::Failed(message) => return Err(TrendsError::JobFailed(message)),
        _ => return Ok(()),
    }

    let records = app.client.distribution_results(base).await?;
    let Some(record) = records.first() else {
        return Err(TrendsError::NotFound("No results found".to_string()));
    };
    let summary = summarize(&record.buckets);

    println!("{:<20} {:>8} {:>12}", "Price range", "Items", "Avg price");
    for row in &summary.buckets {
        println!("{:<20} {:>8} {:>12.1}", row.range, row.count, row.avg_price);
    }
    if summary.influence.is_empty() {
        println!("No attribute separates expensive items from cheap ones");
        return Ok(());
    }
    println!();
    println!("{:<30} {:>8} {:>8} {:>8}", "Attribute", "Score", "Top", "Bottom");
    for metric in &summary.influence {
        println!(
            "{:<30} {:>+7}% {:>7}% {:>7}%",
            metric.attribute, metric.diff, metric.top_freq, metric.bottom_freq
        );
    }
    Ok(())
}

async fn print_gap_table(app: &App, records: &[GapRecord]) {
    let rates = app.rates().await;
    println!(
        "{:<32} {:>12} {:>12} {:>12} {:>8}",
        "Base", "Normal", "Magic", "Gap", "ROI"
    );
    for record in records {
        println!(
            "{:<32} {:>12} {:>12} {:>12} {:>7.0}%",
            record.base_type,
            rates.format_amount(record.normal_avg_chaos, "chaos"),
            rates.format_amount(record.magic_avg_chaos, "chaos"),
            rates.format_amount(record.gap_chaos, "chaos"),
            record.roi_percent()
        );
        for search_id in record.search_id.iter().chain(&record.magic_search_id) {
            match trade_search_url(&app.settings.league, search_id) {
                Ok(url) => println!("    {}", url),
                Err(e) => tracing::warn!("No trade link for {}: {}", record.base_type, e),
            }
        }
    }
}

impl From<ExclusionArgs> for NewExclusion {
    fn from(args: ExclusionArgs) -> Self {
        NewExclusion {
            mod_name_pattern: args.pattern,
            mod_tier: args.tier,
            mod_type: args.mod_type,
            reason: args.reason,
        }
    }
}

async fn exclusions(app: &App, command: ExclusionsCommand) -> Result<()> {
    match command {
        ExclusionsCommand::List => {
            for rule in app.client.exclusions().await? {
                println!(
                    "{} {} pattern={} tier={} type={} {}",
                    rule.id,
                    if rule.is_active { "active  " } else { "inactive" },
                    rule.mod_name_pattern.as_deref().unwrap_or("-"),
                    rule.mod_tier.as_deref().unwrap_or("-"),
                    rule.mod_type.as_deref().unwrap_or("-"),
                    rule.reason.as_deref().unwrap_or("")
                );
            }
        }
        ExclusionsCommand::Add(args) => {
            let rule = app.client.add_exclusion(&args.into()).await?;
            println!("Added exclusion {}", rule.id);
        }
        ExclusionsCommand::Update { id, rule } => {
            let rule = app.client.update_exclusion(&id, &rule.into()).await?;
            println!("Updated exclusion {}", rule.id);
        }
        ExclusionsCommand::Remove { id } => {
            app.client.remove_exclusion(&id).await?;
            println!("Removed exclusion {}", id);
        }
    }
    Ok(())
}

async fn categories(app: &App, command: CategoriesCommand) -> Result<()> {
    match command {
        CategoriesCommand::List => {
            for category in app.client.custom_categories().await? {
                println!(
                    "{} {}: {}",
                    category.id,
                    category.name,
                    category.items.join(", ")
                );
            }
        }
        CategoriesCommand::Add { name, items } => {
            let category = app
                .client
                .add_custom_category(&NewCustomCategory { name, items })
                .await?;
            println!("Added custom category {} ({})", category.name, category.id);
        }
        CategoriesCommand::Remove { id } => {
            app.client.remove_custom_category(&id).await?;
            println!("Removed custom category {}", id);
        }
    }
    Ok(())
}

fn print_analysis(record: &AnalysisRecord, rates: &CurrencyRates) {
    println!(
        "{} {} {} gap {} (ROI {:.0}%)",
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.id,
        record.base_type,
        rates.format_amount(record.gap_chaos, "chaos"),
        record.to_gap_record().roi_percent()
    );
}

async fn analyses(app: &App, command: AnalysesCommand) -> Result<()> {
    let rates = app.rates().await;
    match command {
        AnalysesCommand::Latest {
            base,
            limit,
            categories,
            groups,
        } => {
            let records = app.client.latest_analyses(base.as_deref(), limit).await?;
            if categories.is_empty() && groups.is_empty() {
                for record in &records {
                    print_analysis(record, &rates);
                }
                return Ok(());
            }

            let names = resolve_selection(app, Vec::new(), &categories, &groups, None).await?;
            let selected = retain_selected(&records, &names);
            if selected.is_empty() {
                println!("No stored analyses for the selected bases");
            }
            for record in selected {
                print_analysis(record, &rates);
            }
        }
        AnalysesCommand::List { base, limit } => {
            for record in app.client.analyses(base.as_deref(), limit).await? {
                print_analysis(&record, &rates);
            }
        }
        AnalysesCommand::Show { id } => {
            let record = app.client.analysis(&id).await?;
            print_analysis(&record, &rates);
            for (label, modifiers) in [
                ("Normal", record.normal_modifiers().collect::<Vec<_>>()),
                ("Magic", record.magic_modifiers().collect::<Vec<_>>()),
            ] {
                if modifiers.is_empty() {
                    continue;
                }
                println!("{} modifiers:", label);
                for modifier in modifiers {
                    println!(
                        "  {} {} ({})",
                        modifier.tier,
                        modifier.display_text.as_deref().unwrap_or(&modifier.name),
                        modifier.mod_type
                    );
                }
            }
        }
    }
    Ok(())
}

async fn results(app: &App, command: ResultsCommand) -> Result<()> {
    match command {
        ResultsCommand::Show => {
            let saved = load_results(app.store.as_ref()).await?;
            if saved.is_empty() {
                println!("No saved results");
            } else {
                print_gap_table(app, &saved).await;
            }
        }
        ResultsCommand::Clear => {
            clear_results(app.store.as_ref()).await?;
            println!("Saved results cleared");
        }
    }
    Ok(())
}

fn read_query(path: &Path) -> Result<String> {
    let read = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())
    } else {
        std::fs::read_to_string(path)
    };
    read.map_err(|e| {
        TrendsError::ValidationError(format!("Could not read {}: {}", path.display(), e))
    })
}

fn print_stats(report: &StatsReport, view: &StatsView) -> Result<()> {
    let Some((name, category)) = pick_category(report, view.category.as_deref()) else {
        return match &view.category {
            Some(requested) => Err(TrendsError::NotFound(format!(
                "No {} items in these results",
                requested
            ))),
            None => {
                println!("No items analyzed");
                Ok(())
            }
        };
    };

    let others: Vec<&str> = report.keys().map(String::as_str).filter(|k| *k != name).collect();
    println!("{}: analyzed {} items", name, category.total_items);
    if !others.is_empty() {
        println!("Other categories: {}", others.join(", "));
    }

    let columns = StatColumns::group(category, &view.filter);
    if columns.is_empty() {
        println!("No stats found matching filters");
        return Ok(());
    }
    for (kind, stats) in columns.visible() {
        println!();
        println!("{}", kind.title());
        for stat in stats {
            println!(
                "  {:>5.1}%  {:<48} {:<10} {}",
                stat.percentage,
                stat.name,
                stat.stat_type,
                stat.value_summary()
            );
        }
    }
    Ok(())
}

async fn stats(app: &App, query: &Path, view: &StatsView) -> Result<()> {
    let query = read_query(query)?;
    println!("Searching {}, this can take a minute", app.settings.league);
    let results = app.client.analyze_query(&query, &app.settings.league).await?;

    let run = StatsRun { query, results };
    if let Err(e) = save_last_stats(app.store.as_ref(), &run).await {
        tracing::warn!("Could not keep stats run for saving: {}", e);
    }
    print_stats(&run.results, view)
}

async fn history(app: &App, command: HistoryCommand) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let entries = app.client.history().await?;
            if entries.is_empty() {
                println!("No saved runs");
            }
            for entry in entries {
                println!(
                    "{:<20} {:<32} {}",
                    entry.date.as_deref().unwrap_or("-"),
                    entry.name,
                    entry.filename
                );
            }
            Ok(())
        }
        HistoryCommand::Show { filename, view } => {
            let results = app.client.history_entry(&filename).await?;
            print_stats(&results, &view)
        }
    }
}

async fn save_stats(app: &App, name: &str) -> Result<()> {
    let Some(run) = load_last_stats(app.store.as_ref()).await? else {
        return Err(TrendsError::ValidationError(
            "Nothing to save, run `stats` first".to_string(),
        ));
    };
    let saved = app.client.save_stats(name, &run.query, &run.results).await?;
    println!("Saved as {}", saved.filename);
    Ok(())
}
