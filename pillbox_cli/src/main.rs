use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use pillbox_core::calendar::{month_view, DayStatus};
use pillbox_core::engine::{
    best_current_streak, day_stats, longest_streak, streak_days, weekly_completion,
};
use pillbox_core::intervals::day_detail;
use pillbox_core::*;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pillbox")]
#[command(about = "Personal medication tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a medication
    Add {
        name: String,
        dosage: String,

        /// Doses per active day
        #[arg(long, default_value_t = 1)]
        times: u32,

        /// Take every N days (1 = daily)
        #[arg(long, default_value_t = 1)]
        every: u32,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        icon: Option<String>,

        /// Reminder periods (morning, noon, evening), comma separated
        #[arg(long, value_delimiter = ',')]
        remind: Vec<String>,
    },

    /// Change a medication
    Edit {
        /// Name or id (prefix) of the medication
        medication: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        dosage: Option<String>,

        #[arg(long)]
        times: Option<u32>,

        #[arg(long)]
        every: Option<u32>,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        icon: Option<String>,

        /// Replace reminder periods and enable reminders
        #[arg(long, value_delimiter = ',', conflicts_with = "no_remind")]
        remind: Option<Vec<String>>,

        /// Turn reminders off
        #[arg(long)]
        no_remind: bool,
    },

    /// Delete a medication and all of its logs
    Remove { medication: String },

    /// List medications in display order
    List,

    /// Put medications in the given order
    Reorder {
        #[arg(required = true)]
        medications: Vec<String>,
    },

    /// Log a dose (now, or at an explicit time)
    Take {
        medication: String,

        /// RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM" (today), local time
        #[arg(long)]
        at: Option<String>,
    },

    /// Delete a logged dose
    Untake {
        /// Log id or id prefix
        log_id: String,
    },

    /// Show what is due today (default)
    Today,

    /// Weekly completion and streaks
    Stats,

    /// Month calendar
    Calendar {
        /// Month as YYYY-MM (defaults to the current month)
        #[arg(long)]
        month: Option<String>,

        /// Only evaluate these medications, comma separated
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// Doses and intervals for one day
    Day {
        /// YYYY-MM-DD (defaults to today)
        date: Option<String>,
    },

    /// Export the log history as CSV
    Export {
        #[arg(long)]
        out: PathBuf,
    },

    /// Run the reminder scheduler
    Remind {
        /// Print today's pending reminders and exit
        #[arg(long)]
        once: bool,
    },
}

fn main() -> Result<()> {
    pillbox_core::logging::init();

    let cli = Cli::parse();

    // Only the reminder loop depends on config contents
    let config = match cli.command {
        Some(Commands::Remind { .. }) => Config::load()?,
        _ => Config::load_or_default(),
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);
    let mut store = FileStore::open(&data_dir)?;
    let clock = DayClock::local();

    match cli.command {
        Some(Commands::Add {
            name,
            dosage,
            times,
            every,
            color,
            icon,
            remind,
        }) => {
            let mut new = NewMedication::new(name, dosage)
                .times_per_day(times)
                .every_days(every);
            if let Some(color) = color {
                new.color = color.parse()?;
            }
            if let Some(icon) = icon {
                new.icon = icon.parse()?;
            }
            new.reminder_times = parse_periods(&remind)?;
            new.reminder_enabled = !new.reminder_times.is_empty();
            cmd_add(&mut store, new)
        }
        Some(Commands::Edit {
            medication,
            name,
            dosage,
            times,
            every,
            color,
            icon,
            remind,
            no_remind,
        }) => {
            let mut patch = MedicationPatch {
                name,
                dosage,
                times_per_day: times,
                days_interval: every,
                color: color.map(|c| c.parse()).transpose()?,
                icon: icon.map(|i| i.parse()).transpose()?,
                ..Default::default()
            };
            if let Some(remind) = remind {
                patch.reminder_times = Some(parse_periods(&remind)?);
                patch.reminder_enabled = Some(true);
            }
            if no_remind {
                patch.reminder_enabled = Some(false);
            }
            cmd_edit(&mut store, &medication, patch)
        }
        Some(Commands::Remove { medication }) => cmd_remove(&mut store, &medication),
        Some(Commands::List) => cmd_list(&store),
        Some(Commands::Reorder { medications }) => cmd_reorder(&mut store, &medications),
        Some(Commands::Take { medication, at }) => cmd_take(&mut store, &clock, &medication, at),
        Some(Commands::Untake { log_id }) => cmd_untake(&mut store, &log_id),
        Some(Commands::Stats) => cmd_stats(&store, &clock),
        Some(Commands::Calendar { month, only }) => cmd_calendar(&store, &clock, month, &only),
        Some(Commands::Day { date }) => cmd_day(&store, &clock, date),
        Some(Commands::Export { out }) => cmd_export(&store, &clock, out),
        Some(Commands::Remind { once }) => cmd_remind(&store, clock, &config, once),
        Some(Commands::Today) | None => cmd_today(&store, &clock),
    }
}

fn parse_periods(raw: &[String]) -> Result<Vec<ReminderPeriod>> {
    let mut periods = Vec::new();
    for value in raw.iter().filter(|v| !v.trim().is_empty()) {
        let period: ReminderPeriod = value.parse()?;
        if !periods.contains(&period) {
            periods.push(period);
        }
    }
    periods.sort();
    Ok(periods)
}

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn schedule_label(med: &Medication) -> String {
    let per_day = format!("{}x/day", med.times_per_day);
    match med.effective_interval() {
        1 => per_day,
        n => format!("{} every {} days", per_day, n),
    }
}

fn cmd_add(store: &mut FileStore, new: NewMedication) -> Result<()> {
    let med = store.create_medication(new)?;
    println!("✓ Added {} ({})", med.name, med.dosage);
    println!("  id: {}  {}", short_id(&med.id), schedule_label(&med));
    Ok(())
}

fn cmd_edit(store: &mut FileStore, query: &str, patch: MedicationPatch) -> Result<()> {
    if patch.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }
    let snapshot = store.snapshot()?;
    let id = snapshot.resolve(query)?.id;
    let med = store.update_medication(id, patch)?;
    println!("✓ Updated {} ({}) {}", med.name, med.dosage, schedule_label(&med));
    Ok(())
}

fn cmd_remove(store: &mut FileStore, query: &str) -> Result<()> {
    let snapshot = store.snapshot()?;
    let med = snapshot.resolve(query)?;
    let removed = store.delete_medication(med.id)?;
    println!("✓ Removed {} and {} logs", med.name, removed);
    Ok(())
}

fn cmd_list(store: &FileStore) -> Result<()> {
    let medications = store.list_medications()?;
    if medications.is_empty() {
        println!("No medications yet. Add one with `pillbox add <name> <dosage>`.");
        return Ok(());
    }

    for (index, med) in medications.iter().enumerate() {
        let reminders = if med.active_reminders().is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = med.active_reminders().iter().map(|p| p.as_str()).collect();
            format!("  remind: {}", names.join(","))
        };
        println!(
            "{:>2}. {}  {} ({})  {}  [{} {}]{}",
            index + 1,
            short_id(&med.id),
            med.name,
            med.dosage,
            schedule_label(med),
            med.color,
            med.icon,
            reminders
        );
    }
    Ok(())
}

fn cmd_reorder(store: &mut FileStore, queries: &[String]) -> Result<()> {
    let snapshot = store.snapshot()?;
    let ids = queries
        .iter()
        .map(|q| snapshot.resolve(q).map(|m| m.id))
        .collect::<Result<Vec<_>>>()?;

    let mut local = snapshot.medications.clone();
    reorder_optimistic(&mut local, &ids, |ids| store.reorder_medications(ids))?;

    println!("✓ New order:");
    for (index, med) in local.iter().enumerate() {
        println!("{:>2}. {}", index + 1, med.name);
    }
    Ok(())
}

/// Parse a user-supplied dose time in local time
fn parse_local_time(clock: &DayClock<Local>, raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(clock.instant_at(naive.date(), naive.time()));
        }
    }
    if let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M") {
        let today = clock.day_of(&Utc::now());
        return Ok(clock.instant_at(today, time));
    }
    Err(Error::Validation(format!("unrecognised time: {}", raw)))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("invalid date {:?}: {}", raw, e)))
}

fn cmd_take(
    store: &mut FileStore,
    clock: &DayClock<Local>,
    query: &str,
    at: Option<String>,
) -> Result<()> {
    let snapshot = store.snapshot()?;
    let med = snapshot.resolve(query)?;

    let now = Utc::now();
    let log = match at {
        Some(raw) => {
            let timestamp = parse_local_time(clock, &raw)?;
            if timestamp > now {
                return Err(Error::Validation("cannot log a dose in the future".into()));
            }
            MedicationLog::manual(med.id, timestamp)
        }
        None => MedicationLog::quick(med.id, now),
    };
    let log = store.create_log(log)?;

    let day = clock.day_of(&log.timestamp);
    let day_logs = store.logs_in_range(clock.day_start(day), clock.day_end(day))?;
    let taken = day_logs.iter().filter(|l| l.medication_id == med.id).count();

    println!("✓ Logged {} ({})", med.name, med.dosage);
    println!(
        "  {}  {}/{} on {}  log id: {}",
        log.timestamp.with_timezone(&Local).format("%H:%M"),
        taken,
        med.times_per_day,
        day,
        short_id(&log.id)
    );
    if taken > med.times_per_day as usize {
        println!("  ! Over today's target");
    }
    Ok(())
}

fn cmd_untake(store: &mut FileStore, query: &str) -> Result<()> {
    let query = query.trim().to_lowercase();
    let logs = store.list_logs()?;
    let matches: Vec<&MedicationLog> = logs
        .iter()
        .filter(|l| !query.is_empty() && l.id.to_string().starts_with(&query))
        .collect();

    let log = match matches.as_slice() {
        [single] => *single,
        [] => return Err(Error::NotFound(format!("log {}", query))),
        _ => {
            return Err(Error::Validation(format!(
                "{} matches {} logs, use a longer id",
                query,
                matches.len()
            )))
        }
    };

    store.delete_log(log.id)?;
    println!("✓ Removed log {}", short_id(&log.id));
    Ok(())
}

fn cmd_today(store: &FileStore, clock: &DayClock<Local>) -> Result<()> {
    let snapshot = store.snapshot()?;
    let today = clock.day_of(&Utc::now());

    println!("Today {}", today.format("%a %Y-%m-%d"));
    if snapshot.medications.is_empty() {
        println!("  No medications yet.");
        return Ok(());
    }

    let stats = day_stats(clock, &snapshot.medications, &snapshot.logs, today);
    for status in &stats.medications {
        let Some(med) = snapshot.medication(status.medication_id) else {
            continue;
        };
        let mark = if status.is_over_target() {
            "+"
        } else if status.is_complete() {
            "x"
        } else {
            " "
        };
        let streak = streak_days(clock, med, &snapshot.logs, today);
        println!(
            "  [{}] {} ({})  {}/{}  streak {}d",
            mark, med.name, med.dosage, status.taken, status.target, streak
        );
    }

    let resting: Vec<&Medication> = snapshot
        .medications
        .iter()
        .filter(|m| !clock.is_active_on(m, today))
        .collect();
    for med in resting {
        println!("  [-] {} ({})  not due today", med.name, schedule_label(med));
    }

    println!();
    println!(
        "Completion: {}% ({}/{})",
        stats.completion_rate, stats.total_completed, stats.total_target
    );
    if stats.is_fully_completed {
        println!("✓ All done for today!");
    }
    Ok(())
}

fn bar(rate: u32) -> String {
    let filled = (rate.min(100) / 10) as usize;
    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}

fn cmd_stats(store: &FileStore, clock: &DayClock<Local>) -> Result<()> {
    let snapshot = store.snapshot()?;
    let today = clock.day_of(&Utc::now());
    let week = weekly_completion(clock, &snapshot.medications, &snapshot.logs, today);

    println!("Last 7 days");
    for day in &week.days {
        let marker = if day.is_fully_completed { " ✓" } else { "" };
        println!(
            "  {}  {} {:>3}%{}",
            day.date.format("%a %m-%d"),
            bar(day.completion_rate),
            day.completion_rate,
            marker
        );
    }
    println!();
    println!("Weekly average: {}%", week.average_completion_rate);
    println!("Perfect days: {}", week.perfect_day_count);
    println!(
        "Best current streak: {} days",
        best_current_streak(clock, &snapshot.medications, &snapshot.logs, today)
    );

    if !snapshot.medications.is_empty() {
        println!();
        println!("Streaks");
        for med in &snapshot.medications {
            println!(
                "  {}  current {}d  longest {}d",
                med.name,
                streak_days(clock, med, &snapshot.logs, today),
                longest_streak(clock, med, &snapshot.logs, today)
            );
        }
    }
    Ok(())
}

fn cmd_calendar(
    store: &FileStore,
    clock: &DayClock<Local>,
    month: Option<String>,
    only: &[String],
) -> Result<()> {
    let snapshot = store.snapshot()?;
    let today = clock.day_of(&Utc::now());

    let (year, month) = match month {
        Some(raw) => {
            let first = parse_date(&format!("{}-01", raw.trim()))?;
            (first.year(), first.month())
        }
        None => (today.year(), today.month()),
    };

    let selected: Vec<Uuid> = if only.is_empty() {
        snapshot.medications.iter().map(|m| m.id).collect()
    } else {
        only.iter()
            .map(|q| snapshot.resolve(q).map(|m| m.id))
            .collect::<Result<_>>()?
    };

    let view = month_view(
        clock,
        &snapshot.medications,
        &snapshot.logs,
        &selected,
        year,
        month,
        today,
    )?;

    println!("{:04}-{:02}", view.year, view.month);
    println!(" Su  Mo  Tu  We  Th  Fr  Sa");
    let mut line = "    ".repeat(view.leading_blanks as usize);
    let mut column = view.leading_blanks;
    for day in &view.days {
        let mark = match day.status {
            DayStatus::AllCompleted => '*',
            DayStatus::Partial => '+',
            DayStatus::NoLogs => ' ',
            DayStatus::Future => '.',
        };
        let open = if day.is_today { '[' } else { ' ' };
        line.push_str(&format!("{}{:>2}{}", open, day.date.day(), mark));
        column += 1;
        if column == 7 {
            println!("{}", line.trim_end());
            line.clear();
            column = 0;
        }
    }
    if !line.is_empty() {
        println!("{}", line.trim_end());
    }
    println!();
    println!("* all completed   + partial   . future   [ today");
    Ok(())
}

fn cmd_day(store: &FileStore, clock: &DayClock<Local>, date: Option<String>) -> Result<()> {
    let snapshot = store.snapshot()?;
    let today = clock.day_of(&Utc::now());
    let date = match date {
        Some(raw) => parse_date(&raw)?,
        None => today,
    };
    if date > today {
        return Err(Error::Validation(format!("{} is in the future", date)));
    }

    if date == today {
        println!("Today");
    } else {
        println!("{}", date.format("%A %Y-%m-%d"));
    }

    let detail = day_detail(clock, &snapshot.medications, &snapshot.logs, date);
    if detail.is_empty() {
        println!("  No doses logged on this day.");
        return Ok(());
    }

    for group in &detail {
        let over = if group.is_over_target() { "  over target" } else { "" };
        println!(
            "  {} ({})  {}/{}{}",
            group.medication.name,
            group.medication.dosage,
            group.logs.len(),
            group.medication.times_per_day,
            over
        );
        for (index, log) in group.logs.iter().enumerate() {
            let manual = if log.is_manual { " (manual)" } else { "" };
            let gap = index
                .checked_sub(1)
                .and_then(|i| group.intervals.intervals.get(i))
                .map(|d| format!("  +{}", format_interval(*d)))
                .unwrap_or_default();
            println!(
                "    {}{}{}",
                log.timestamp.with_timezone(&Local).format("%H:%M"),
                manual,
                gap
            );
        }
        if let Some(average) = group.intervals.average {
            println!("    average interval {}", format_interval(average));
        }
    }
    Ok(())
}

fn cmd_export(store: &FileStore, clock: &DayClock<Local>, out: PathBuf) -> Result<()> {
    let snapshot = store.snapshot()?;
    let rows = pillbox_core::export::export_to_path(clock, &snapshot, &out)?;
    println!("✓ Exported {} logs to {}", rows, out.display());
    Ok(())
}

fn cmd_remind(
    store: &FileStore,
    clock: DayClock<Local>,
    config: &Config,
    once: bool,
) -> Result<()> {
    let mut scheduler = ReminderScheduler::new(clock, config.reminders.clone());

    if once {
        let snapshot = store.snapshot()?;
        let pending = scheduler.plan(&snapshot.medications, Utc::now());
        if pending.is_empty() {
            println!("No reminders pending today.");
        }
        for key in pending {
            let name = snapshot
                .medication(key.medication_id)
                .map(|m| m.name.as_str())
                .unwrap_or("?");
            let time = config.reminders.time_for(key.period);
            println!("  {} {}  {}", time.format("%H:%M"), key.period, name);
        }
        return Ok(());
    }

    let poll = std::time::Duration::from_secs(config.reminders.poll_seconds);
    println!("Watching reminders (Ctrl-C to stop)");
    loop {
        let snapshot = store.snapshot()?;
        let now = Utc::now();
        scheduler.plan(&snapshot.medications, now);
        for notice in scheduler.due(now) {
            println!(
                "[{}] {}: {}",
                now.with_timezone(&Local).format("%H:%M"),
                notice.title,
                notice.body
            );
        }
        std::thread::sleep(poll);
    }
}
