//! `rapport`: share your profile as a link, receive other people's, and
//! collect reciprocal shares from the server mailbox.
//!
//! # Usage
//!
//! ```text
//! rapport share --group g1 --privacy direct-only
//! rapport receive 'https://rapport.app/share/Ab3dE_9xQz' --reciprocate
//! rapport poll
//! rapport contacts
//! ```

use std::{
  path::PathBuf,
  sync::Arc,
  time::Duration,
};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rapport_cli::{
  ClientError,
  book::ContactBook,
  client::{ApiClient, ApiConfig, Mailbox},
  events::BookEvent,
  poller::{self, PollerConfig},
  profile::{self, Profile},
  repository::JsonFileRepository,
  share::{self, ShortenPolicy},
};
use rapport_core::{paths::expand_tilde, payload::SharePayload, privacy::PrivacyLevel};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rapport", version, about = "Share contact details by link or QR code")]
struct Args {
  /// Path to a TOML config file (url, data_dir, poll_interval_secs, timeout_secs).
  #[arg(short, long, value_name = "FILE", global = true)]
  config: Option<PathBuf>,

  /// Base URL of the rapport server (default: http://localhost:8787).
  #[arg(long, env = "RAPPORT_URL", global = true)]
  url: Option<String>,

  /// Where contacts, the profile and the profile id live
  /// (default: ~/.local/share/rapport).
  #[arg(long, env = "RAPPORT_DATA_DIR", global = true)]
  data_dir: Option<PathBuf>,

  /// Network timeout in seconds (default: 10).
  #[arg(long, value_name = "SECS", global = true)]
  timeout: Option<u64>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print a share link and QR code for your profile.
  Share {
    /// Profile file (default: <data_dir>/profile.toml).
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,
    /// Share only these groups; repeatable. Default: every group.
    #[arg(short, long = "group", value_name = "ID")]
    groups:  Vec<String>,
    /// public, second-degree or direct-only. Default: the profile's setting.
    #[arg(long)]
    privacy: Option<String>,
    /// Always hand out a short server link.
    #[arg(long, conflicts_with = "no_shorten")]
    short:   bool,
    /// Never contact the server; fail if the link is too long for a QR code.
    #[arg(long)]
    no_shorten: bool,
    /// Print the link only.
    #[arg(long)]
    no_qr:   bool,
  },
  /// Save someone's share from a link, alias or pasted token.
  Receive {
    link: String,
    /// Send your own profile back to the sender's mailbox.
    #[arg(long)]
    reciprocate: bool,
    /// Profile file used when reciprocating.
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,
  },
  /// Collect shares sent back to you.
  Poll {
    /// Drain one batch and exit.
    #[arg(long)]
    once: bool,
    /// Seconds between polls (default: 5).
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,
  },
  /// List saved contacts.
  Contacts,
}

// ─── Config file ─────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:                String,
  #[serde(default)]
  data_dir:           Option<PathBuf>,
  #[serde(default)]
  poll_interval_secs: Option<u64>,
  #[serde(default)]
  timeout_secs:       Option<u64>,
}

/// Effective settings after layering flags over the file over defaults.
struct Settings {
  api:           ApiConfig,
  data_dir:      PathBuf,
  poll_interval: Duration,
}

impl Settings {
  fn contacts_path(&self) -> PathBuf { self.data_dir.join("contacts.json") }

  fn profile_path(&self, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| self.data_dir.join("profile.toml"))
  }

  fn book(&self) -> ContactBook<JsonFileRepository> {
    ContactBook::new(JsonFileRepository::new(self.contacts_path()))
  }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let settings = Settings {
    api:           ApiConfig {
      base_url: args
        .url
        .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
        .unwrap_or_else(|| "http://localhost:8787".to_string()),
      timeout:  Duration::from_secs(args.timeout.or(file_cfg.timeout_secs).unwrap_or(10)),
    },
    data_dir:      expand_tilde(
      &args
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| PathBuf::from("~/.local/share/rapport")),
    ),
    poll_interval: Duration::from_secs(file_cfg.poll_interval_secs.unwrap_or(5)),
  };

  match args.command {
    Command::Share { profile, groups, privacy, short, no_shorten, no_qr } => {
      let policy = if short {
        ShortenPolicy::Always
      } else if no_shorten {
        ShortenPolicy::Never
      } else {
        ShortenPolicy::OnOverflow
      };
      run_share(&settings, profile, &groups, privacy.as_deref(), policy, no_qr).await
    }
    Command::Receive { link, reciprocate, profile } => {
      run_receive(&settings, &link, reciprocate.then_some(profile)).await
    }
    Command::Poll { once, interval } => run_poll(&settings, once, interval).await,
    Command::Contacts => run_contacts(&settings),
  }
}

/// Log the full error, surface the short user-facing line.
fn user_error(e: ClientError) -> anyhow::Error {
  tracing::debug!(error = ?e, "command failed");
  anyhow!(e.user_message())
}

fn load_own_payload(
  settings: &Settings,
  profile_flag: Option<PathBuf>,
  groups: &[String],
  privacy: Option<PrivacyLevel>,
) -> Result<(String, SharePayload)> {
  let profile = Profile::load(&settings.profile_path(profile_flag)).map_err(user_error)?;
  let id = profile::profile_id(&settings.data_dir).context("reading profile id")?;
  let payload = profile.payload(&id, groups, privacy).map_err(user_error)?;
  Ok((id, payload))
}

// ─── share ───────────────────────────────────────────────────────────────────

async fn run_share(
  settings: &Settings,
  profile_flag: Option<PathBuf>,
  groups: &[String],
  privacy: Option<&str>,
  policy: ShortenPolicy,
  no_qr: bool,
) -> Result<()> {
  let privacy = privacy.map(PrivacyLevel::parse);
  let (_, payload) = load_own_payload(settings, profile_flag, groups, privacy)?;
  let client = ApiClient::new(settings.api.clone()).map_err(user_error)?;

  let link = share::create_share(&client, client.base_url(), &payload, policy)
    .await
    .map_err(user_error)?;

  if !no_qr {
    if link.fits_qr() {
      let qr = share::render_qr(&link.link).context("rendering QR code")?;
      println!("{qr}");
    } else {
      eprintln!(
        "This link is {} characters, too long for a QR code (limit {}). \
         Remove a group or fact, or try again when the server is reachable.",
        link.capacity.length, link.capacity.limit
      );
    }
  }

  if payload.privacy.requires_warning() {
    eprintln!("Shared as {}.", payload.privacy);
  }
  println!("{}", link.link);
  Ok(())
}

// ─── receive ─────────────────────────────────────────────────────────────────

async fn run_receive(
  settings: &Settings,
  input: &str,
  reciprocate: Option<Option<PathBuf>>,
) -> Result<()> {
  let client = ApiClient::new(settings.api.clone()).map_err(user_error)?;
  let payload = share::receive(&client, input).await.map_err(user_error)?;

  if payload.privacy.requires_warning() {
    eprintln!(
      "{} marked this share {}; please don't pass it on.",
      payload.owner.name, payload.privacy
    );
  }

  let book = settings.book();
  let outcome = book.merge(&payload).map_err(user_error)?;
  if outcome.was_created {
    println!("Added {} ({} facts).", outcome.contact.name, outcome.added_facts);
  } else if outcome.added_facts > 0 {
    println!("Updated {}: {} new facts.", outcome.contact.name, outcome.added_facts);
  } else {
    println!("{} is already up to date.", outcome.contact.name);
  }

  if let Some(profile_flag) = reciprocate {
    let (my_id, mine) = load_own_payload(settings, profile_flag, &[], None)?;
    // The server ignores self-shares, but there is no point sending one.
    if my_id == payload.owner.id {
      return Ok(());
    }
    match client.send(&my_id, &payload.owner.id, &mine).await {
      Ok(()) => println!("Sent your profile back to {}.", payload.owner.name),
      Err(e) => eprintln!("Could not send your profile back: {}", e.user_message()),
    }
  }

  Ok(())
}

// ─── poll ────────────────────────────────────────────────────────────────────

async fn run_poll(settings: &Settings, once: bool, interval: Option<u64>) -> Result<()> {
  let client = Arc::new(ApiClient::new(settings.api.clone()).map_err(user_error)?);
  let book = Arc::new(settings.book());
  let profile_id = profile::profile_id(&settings.data_dir).context("reading profile id")?;

  if once {
    let report = poller::poll_once(&*client, &*book, &profile_id)
      .await
      .map_err(user_error)?;
    println!("{} received, {} saved, {} rejected.", report.delivered, report.merged, report.rejected);
    if report.deferred > 0 {
      anyhow::bail!("{} received contact(s) could not be saved to {}", report.deferred, settings.data_dir.display());
    }
    return Ok(());
  }

  let mut events = book.events().subscribe();
  let config = PollerConfig {
    profile_id,
    interval: interval.map(Duration::from_secs).unwrap_or(settings.poll_interval),
  };
  let handle = poller::start_polling(client, book, config);
  eprintln!("Polling for shares; press Ctrl-C to stop.");

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      event = events.recv() => match event {
        Ok(BookEvent::ContactCreated { name, facts, .. }) => {
          println!("Added {name} ({facts} facts).");
        }
        Ok(BookEvent::ContactUpdated { remote_id, added_facts, .. }) => {
          println!("Updated {remote_id}: {added_facts} new facts.");
        }
        Ok(BookEvent::ExchangeMerged { .. }) => {}
        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
          tracing::warn!(skipped = n, "event display fell behind");
        }
        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
      },
    }
  }

  handle.stop().await.context("poller task failed")?;
  Ok(())
}

// ─── contacts ────────────────────────────────────────────────────────────────

fn run_contacts(settings: &Settings) -> Result<()> {
  let mut contacts = settings.book().contacts().map_err(user_error)?;
  contacts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

  if contacts.is_empty() {
    println!("No contacts yet.");
  }
  for contact in contacts {
    println!("{}", contact.name);
    for (label, value) in [
      ("phone", &contact.phone),
      ("telegram", &contact.telegram),
      ("instagram", &contact.instagram),
    ] {
      if let Some(value) = value {
        println!("  {label}: {value}");
      }
    }
    for group in &contact.groups {
      println!("  [{}]", group.name);
      for fact in &group.facts {
        println!("    - {}", fact.text);
      }
    }
    for note in &contact.notes {
      println!("  note: {note}");
    }
  }
  Ok(())
}
