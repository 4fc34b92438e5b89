//! `quill onboard`, `status`, `sign-out` and `topics` against the local
//! file-backed stores.

use std::{
    io::{BufRead, Write},
    sync::Arc,
};

use {
    anyhow::Result,
    chrono::Utc,
    clap::Args,
    quill_common::UserId,
    quill_config::QuillConfig,
    quill_identity::{IdentityRecord, MemoryIdentityProvider, SignInOutcome},
    quill_onboarding::{
        FileKeyValueStore, FileProfileStore, FlagStore, MemoryNavigator, OnboardingService,
        SessionCache, Stage, catalog::TOPICS, run_wizard,
    },
    tracing::debug,
};

#[derive(Args, Debug, Clone)]
pub struct OnboardArgs {
    /// Account email.
    #[arg(long)]
    pub email: String,
    /// Provider user id. Defaults to the email address.
    #[arg(long)]
    pub uid: Option<String>,
    /// Display name reported by the provider.
    #[arg(long)]
    pub name: Option<String>,
    /// Photo URL reported by the provider.
    #[arg(long)]
    pub photo_url: Option<String>,
}

fn open_kv(config: &QuillConfig) -> Result<Arc<FileKeyValueStore>> {
    let path = config.storage.flags_path();
    debug!(path = %path.display(), "opening local storage");
    Ok(Arc::new(FileKeyValueStore::open(path)?))
}

/// The identity the local provider reports. A user seen before keeps their
/// original creation time, so they sign in as a returning account.
fn local_identity(args: &OnboardArgs, session: &SessionCache) -> Result<IdentityRecord> {
    let uid = UserId::new(args.uid.clone().unwrap_or_else(|| args.email.clone()))?;
    let now = Utc::now();
    let created_at = session
        .snapshot(&uid)
        .and_then(|s| s.created_at)
        .unwrap_or(now);

    let mut record = IdentityRecord::new_account(uid, args.email.clone(), created_at).signed_in_at(now);
    if let Some(name) = &args.name {
        record = record.with_display_name(name);
    }
    if let Some(url) = &args.photo_url {
        record = record.with_avatar_url(url);
    }
    Ok(record)
}

pub async fn handle_onboard(args: OnboardArgs, config: &QuillConfig) -> Result<()> {
    let stdin = std::io::stdin();
    let mut reader = stdin.lock();
    let mut writer = std::io::stdout();
    run_onboard(&args, config, &mut reader, &mut writer).await?;
    Ok(())
}

pub async fn run_onboard<R: BufRead, W: Write>(
    args: &OnboardArgs,
    config: &QuillConfig,
    reader: &mut R,
    writer: &mut W,
) -> Result<Stage> {
    let kv = open_kv(config)?;
    let session = SessionCache::new(kv.clone());
    let record = local_identity(args, &session)?;

    let identity = Arc::new(MemoryIdentityProvider::new());
    identity.enqueue_sign_in(SignInOutcome::Account(record));

    let service = OnboardingService::new(
        identity,
        Arc::new(FileProfileStore::new(config.storage.profiles_path())),
        kv,
        Arc::new(MemoryNavigator::default()),
        config.clone(),
    );

    let stage = service.sign_in().await?;
    writeln!(writer, "Signed in as {} ({})", args.email, stage.route())?;
    Ok(run_wizard(&service, reader, writer).await?)
}

pub fn handle_status(uid: &str, json: bool, config: &QuillConfig) -> Result<()> {
    let mut out = std::io::stdout();
    write_status(uid, json, config, &mut out)
}

fn write_status<W: Write>(uid: &str, json: bool, config: &QuillConfig, out: &mut W) -> Result<()> {
    let uid = UserId::new(uid)?;
    let kv = open_kv(config)?;
    let flags = FlagStore::new(kv.clone()).get_flags(&uid);
    let snapshot = SessionCache::new(kv).snapshot(&uid);

    // Status is reported as if the user were signed in right now.
    let now = Utc::now();
    let identity = IdentityRecord::new_account(
        uid.clone(),
        snapshot.as_ref().map(|s| s.email.clone()).unwrap_or_default(),
        now,
    );
    let stage = quill_onboarding::resolve(Some(&identity), flags.as_ref());

    if json {
        let value = serde_json::json!({
            "uid": uid.as_str(),
            "record": flags.is_some(),
            "profileCompleted": flags.as_ref().is_some_and(|f| f.profile_completed),
            "topicsSelected": flags.as_ref().is_some_and(|f| f.topics_selected),
            "topics": flags.as_ref().map(|f| f.selected_topics.iter().collect::<Vec<_>>()),
            "fullName": flags.as_ref().and_then(|f| f.cached_profile.as_ref()).map(|p| p.full_name.as_str()),
            "stage": stage,
            "route": stage.route(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }

    writeln!(out, "User:              {uid}")?;
    let Some(flags) = flags else {
        writeln!(out, "No onboarding record.")?;
        writeln!(out, "Stage:             {stage} ({})", stage.route())?;
        return Ok(());
    };
    writeln!(out, "Profile completed: {}", flags.profile_completed)?;
    writeln!(out, "Topics selected:   {}", flags.topics_selected)?;
    if !flags.selected_topics.is_empty() {
        let topics: Vec<&str> = flags.selected_topics.iter().map(String::as_str).collect();
        writeln!(out, "Topics:            {}", topics.join(", "))?;
    }
    if let Some(profile) = &flags.cached_profile {
        writeln!(out, "Name:              {}", profile.full_name)?;
        let image = if profile.avatar_source().is_custom_upload() {
            "custom upload"
        } else if profile.profile_image.is_empty() {
            "none"
        } else {
            "provider photo"
        };
        writeln!(out, "Image:             {image}")?;
    }
    writeln!(out, "Stage:             {stage} ({})", stage.route())?;
    Ok(())
}

pub fn handle_sign_out(config: &QuillConfig) -> Result<()> {
    let session = SessionCache::new(open_kv(config)?);
    match session.current_user() {
        Some(user) => {
            session.forget_current_user()?;
            println!("Signed out {}.", user.uid);
        },
        None => println!("Nobody is signed in."),
    }
    Ok(())
}

pub fn handle_topics(config: &QuillConfig) {
    println!(
        "Choose at least {} of {} topics:",
        config.onboarding.min_topics,
        TOPICS.len()
    );
    for (i, topic) in TOPICS.iter().enumerate() {
        println!("{:>3}. {topic}", i + 1);
    }
}
