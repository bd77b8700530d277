use anyhow::Context;
use futures::StreamExt;
use pitchcraft::{
    ClientConfig, GenerateOptions, ParseOptions, ProposalGenerator, ProposalSection,
    PromptContext, StreamEvent, extract_partial, parse_ai_response,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub struct GenerateArgs {
    pub context: PathBuf,
    pub sections: Vec<String>,
    pub strict: bool,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
    pub stream: bool,
    pub concurrency: Option<usize>,
}

/// Parse section names; an empty list means every section.
fn parse_sections(names: &[String]) -> anyhow::Result<Vec<ProposalSection>> {
    let sections = names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.parse::<ProposalSection>())
        .collect::<Result<Vec<_>, _>>()?;
    if sections.is_empty() {
        return Ok(ProposalSection::ALL.to_vec());
    }
    Ok(sections)
}

fn read_context(path: &Path) -> anyhow::Result<PromptContext> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading context file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing context file {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn run_generate(config_path: Option<&Path>, args: GenerateArgs) -> anyhow::Result<()> {
    let config = ClientConfig::resolve(config_path)?;
    let context = read_context(&args.context)?;
    let sections = parse_sections(&args.sections)?;
    let options = GenerateOptions {
        max_retries: args.max_retries,
        allow_partial: !args.strict,
        model: args.model,
    };
    let generator = ProposalGenerator::anthropic(config);

    if args.stream {
        let mut events = generator.stream(&context, &sections, &options);
        let mut stderr = std::io::stderr();
        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Chunk { text } => {
                    write!(stderr, "{text}")?;
                    stderr.flush()?;
                }
                StreamEvent::Error { code, message } => {
                    writeln!(stderr)?;
                    anyhow::bail!("{code}: {message}");
                }
                done @ StreamEvent::Done { .. } => {
                    writeln!(stderr)?;
                    print_json(&done)?;
                }
            }
        }
        return Ok(());
    }

    let result = match args.concurrency {
        Some(n) => {
            generator
                .generate_concurrent(&context, &sections, &options, n)
                .await?
        }
        None => generator.generate(&context, &sections, &options).await?,
    };
    if result.is_partial {
        tracing::warn!(failed = ?result.failed_sections, "some sections could not be generated");
    }
    print_json(&result)
}

pub async fn run_section(
    config_path: Option<&Path>,
    context_path: &Path,
    section: &str,
) -> anyhow::Result<()> {
    let config = ClientConfig::resolve(config_path)?;
    let context = read_context(context_path)?;
    let section: ProposalSection = section.parse()?;
    let result = ProposalGenerator::anthropic(config)
        .generate_single_section(&context, section)
        .await?;
    print_json(&result)
}

pub fn run_parse(
    file: Option<&Path>,
    strict: bool,
    sections: &[String],
    best_effort: bool,
) -> anyhow::Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading model output from stdin")?;
            buf
        }
    };

    let document = if best_effort {
        extract_partial(&raw)
    } else {
        parse_ai_response(&raw, &parse_options(strict, sections)?)?
    };
    print_json(&document)
}

fn parse_options(strict: bool, sections: &[String]) -> anyhow::Result<ParseOptions> {
    let required = if sections.is_empty() {
        None
    } else {
        Some(parse_sections(sections)?)
    };
    Ok(ParseOptions {
        allow_partial: !strict,
        required_sections: required,
    })
}
