//! Terminal onboarding wizard driven by the same service the pages use.

use std::io::{BufRead, Write};

use tracing::debug;

use crate::{
    avatar::ImageUpload,
    catalog::TOPICS,
    error::{Error, Result},
    service::OnboardingService,
    stage::Stage,
};

/// Walk the signed-in user through the remaining onboarding stages.
///
/// Validation and remote-write failures are reported and the step is asked
/// again; end of input aborts.
pub async fn run_wizard<R: BufRead, W: Write>(
    service: &OnboardingService,
    reader: &mut R,
    writer: &mut W,
) -> Result<Stage> {
    loop {
        let stage = service.current_stage();
        debug!(%stage, "wizard step");
        match stage {
            Stage::AnonymousLanding => {
                writeln!(writer, "Not signed in.")?;
                return Err(Error::NotAuthenticated);
            },
            Stage::ProfileCompletion => profile_step(service, reader, writer).await?,
            Stage::TopicSelection => topics_step(service, reader, writer).await?,
            Stage::Dashboard => {
                writeln!(writer, "Onboarding complete!")?;
                return Ok(Stage::Dashboard);
            },
        }
    }
}

async fn profile_step<R: BufRead, W: Write>(
    service: &OnboardingService,
    reader: &mut R,
    writer: &mut W,
) -> Result<()> {
    let mut draft = service.start_profile()?;
    writeln!(writer, "Complete your profile ({})", draft.email)?;

    let name = prompt(reader, writer, &format!("Full name [{}]", draft.full_name))?;
    if !name.is_empty() {
        draft.full_name = name;
    }

    loop {
        let answer = prompt(
            reader,
            writer,
            "Profile image path (enter keeps current, '-' removes, 'g' uses provider photo)",
        )?;
        match answer.as_str() {
            "" => break,
            "-" => {
                draft.remove_image();
                break;
            },
            "g" => {
                if !draft.reset_to_provider() {
                    writeln!(writer, "No provider photo available.")?;
                }
                break;
            },
            path => {
                let path = std::path::Path::new(path);
                let bytes = match tokio::fs::read(path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        writeln!(writer, "Error reading file: {e}")?;
                        continue;
                    },
                };
                match draft.upload(ImageUpload::from_path_bytes(path, bytes)) {
                    Ok(()) => break,
                    Err(e) => writeln!(writer, "{e}")?,
                }
            },
        }
    }

    match service.commit_profile(&draft).await {
        Ok(_) => Ok(()),
        Err(e @ (Error::InvalidInput { .. } | Error::RemoteWriteFailed { .. })) => {
            writeln!(writer, "Error completing profile: {e}. Please try again.")?;
            Ok(())
        },
        Err(e) => Err(e),
    }
}

async fn topics_step<R: BufRead, W: Write>(
    service: &OnboardingService,
    reader: &mut R,
    writer: &mut W,
) -> Result<()> {
    let min = service.config().onboarding.min_topics;
    writeln!(writer, "What are you interested in? Choose {min} or more.")?;
    for (i, topic) in TOPICS.iter().enumerate() {
        writeln!(writer, "{:>3}. {topic}", i + 1)?;
    }

    let answer = prompt(reader, writer, "Topics (numbers or names, comma separated)")?;
    let topics: Vec<String> = answer
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| match t.parse::<usize>() {
            Ok(n) if (1..=TOPICS.len()).contains(&n) => TOPICS[n - 1].to_string(),
            _ => t.to_string(),
        })
        .collect();

    match service.commit_topics(&topics).await {
        Ok(_) => Ok(()),
        Err(e @ (Error::InvalidInput { .. } | Error::RemoteWriteFailed { .. })) => {
            writeln!(writer, "{e}")?;
            Ok(())
        },
        Err(e) => Err(e),
    }
}

fn prompt<R: BufRead, W: Write>(reader: &mut R, writer: &mut W, label: &str) -> Result<String> {
    write!(writer, "{label}\n> ")?;
    writer.flush()?;
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(Error::message("input closed before onboarding finished"));
    }
    Ok(line.trim().to_string())
}
