use clap::{Parser, Subcommand};
use log::error;
use pdfmill::api;
use pdfmill::config::{Configuration, ValidationMode};
use pdfmill::crypto::{
    Permissions, PERM_ACCESSIBILITY, PERM_ANNOTATE, PERM_ASSEMBLE, PERM_COPY, PERM_FILL_FORMS,
    PERM_MODIFY, PERM_PRINT, PERM_PRINT_HIGH_RES,
};
use pdfmill::pages::PAPER_SIZES;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pdfmill")]
#[command(version)]
#[command(about = "Read, validate, transform and rewrite PDF documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Validation mode: none, relaxed or strict
    #[arg(short, long, global = true, default_value = "relaxed")]
    mode: String,

    /// User password of encrypted input
    #[arg(long, global = true, default_value = "")]
    upw: String,

    /// Owner password of encrypted input
    #[arg(long, global = true, default_value = "")]
    opw: String,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a document against ISO 32000-1
    Validate { input: PathBuf },

    /// Optimize: deduplicate resources and drop unreachable objects
    Optimize {
        input: PathBuf,
        output: Option<PathBuf>,
    },

    /// Split into documents of SPAN pages each
    Split {
        input: PathBuf,
        out_dir: PathBuf,
        /// Pages per output document
        #[arg(long, default_value_t = 1)]
        span: usize,
    },

    /// Merge documents in argument order; the first catalog wins
    Merge {
        output: PathBuf,
        inputs: Vec<PathBuf>,
    },

    /// Extract selected pages as single-page documents
    Extract {
        input: PathBuf,
        out_dir: PathBuf,
        #[arg(long, default_value = "1-")]
        pages: String,
    },

    /// Keep only the selected pages
    Trim {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        pages: String,
    },

    /// Rotate selected pages by a multiple of 90 degrees
    Rotate {
        input: PathBuf,
        rotation: i64,
        #[arg(long, default_value = "1-")]
        pages: String,
        output: Option<PathBuf>,
    },

    /// Insert or remove pages
    Pages {
        #[command(subcommand)]
        action: PagesAction,
    },

    /// Manage embedded file attachments
    Attach {
        #[command(subcommand)]
        action: AttachAction,
    },

    /// List or set document permissions
    Perm {
        #[command(subcommand)]
        action: PermAction,
    },

    /// Encrypt a document
    Encrypt {
        input: PathBuf,
        output: Option<PathBuf>,
        /// Key length in bits: 40, 128 or 256
        #[arg(long, default_value_t = 256)]
        key_length: u16,
        /// Use RC4 instead of AES where the key length allows it
        #[arg(long)]
        no_aes: bool,
        /// Permissions to grant: all, none, or a comma-separated list
        #[arg(long, default_value = "none")]
        perms: String,
    },

    /// Decrypt a document
    Decrypt {
        input: PathBuf,
        output: Option<PathBuf>,
    },

    /// Change the user password
    Changeupw {
        input: PathBuf,
        old_pw: String,
        new_pw: String,
        output: Option<PathBuf>,
    },

    /// Change the owner password
    Changeopw {
        input: PathBuf,
        old_pw: String,
        new_pw: String,
        output: Option<PathBuf>,
    },

    /// Print document properties
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// Print version information
    Version,

    /// List supported paper formats
    Paper,
}

#[derive(Subcommand)]
enum PagesAction {
    /// Insert a blank page before each selected page
    Insert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        pages: String,
    },
    /// Remove the selected pages
    Remove {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        pages: String,
    },
}

#[derive(Subcommand)]
enum AttachAction {
    /// List attachment names
    List { input: PathBuf },
    /// Attach files
    Add {
        input: PathBuf,
        files: Vec<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Remove attachments by name
    Remove {
        input: PathBuf,
        names: Vec<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Extract attachments into a directory
    Extract {
        input: PathBuf,
        out_dir: PathBuf,
        names: Vec<String>,
    },
}

#[derive(Subcommand)]
enum PermAction {
    /// Show the permission flags
    List { input: PathBuf },
    /// Set permission flags (requires the owner password)
    Set {
        input: PathBuf,
        /// all, none, or a comma-separated list of flags
        perms: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Canonical command names for unambiguous-prefix resolution.
const COMMANDS: &[&str] = &[
    "validate", "optimize", "split", "merge", "extract", "trim", "rotate", "pages", "attach",
    "perm", "encrypt", "decrypt", "changeupw", "changeopw", "info", "version", "paper", "help",
];

/// Expand an unambiguous command prefix, so `val` runs `validate`.
fn resolve_command_prefix(args: Vec<String>) -> Vec<String> {
    let mut args = args;
    let Some(candidate) = args.get(1).cloned() else {
        return args;
    };
    if candidate.starts_with('-') || COMMANDS.contains(&candidate.as_str()) {
        return args;
    }
    let matches: Vec<&&str> = COMMANDS
        .iter()
        .filter(|c| c.starts_with(&candidate))
        .collect();
    if matches.len() == 1 {
        args[1] = matches[0].to_string();
    }
    args
}

fn main() -> ExitCode {
    let args = resolve_command_prefix(std::env::args().collect());
    // Usage failures exit 1, like every other error; help and version
    // are not failures.
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let failure = err.use_stderr();
            let _ = err.print();
            return if failure {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match api::guarded(|| run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn configuration(cli: &Cli) -> Result<Configuration, pdfmill::Error> {
    let validation_mode = match cli.mode.as_str() {
        "none" => ValidationMode::None,
        "relaxed" => ValidationMode::Relaxed,
        "strict" => ValidationMode::Strict,
        other => {
            return Err(pdfmill::Error::Internal(format!(
                "unknown validation mode {}",
                other
            )))
        }
    };
    Ok(Configuration {
        validation_mode,
        user_pw: cli.upw.clone(),
        owner_pw: cli.opw.clone(),
        ..Default::default()
    })
}

fn parse_perms(spec: &str) -> Result<Permissions, pdfmill::Error> {
    match spec {
        "all" => return Ok(Permissions::all()),
        "none" => return Ok(Permissions::none()),
        _ => {}
    }
    let mut perms = Permissions::none();
    for term in spec.split(',') {
        let bit = match term.trim() {
            "print" => PERM_PRINT,
            "modify" => PERM_MODIFY,
            "copy" => PERM_COPY,
            "annotate" => PERM_ANNOTATE,
            "fillforms" => PERM_FILL_FORMS,
            "accessibility" => PERM_ACCESSIBILITY,
            "assemble" => PERM_ASSEMBLE,
            "printhq" => PERM_PRINT_HIGH_RES,
            other => {
                return Err(pdfmill::Error::Internal(format!(
                    "unknown permission {}",
                    other
                )))
            }
        };
        perms.grant(bit);
    }
    Ok(perms)
}

/// Output path defaulting to in-place rewrite.
fn out_or<'a>(output: &'a Option<PathBuf>, input: &'a Path) -> &'a Path {
    output.as_deref().unwrap_or(input)
}

fn run(cli: Cli) -> Result<(), pdfmill::Error> {
    let conf = configuration(&cli)?;

    match cli.command {
        Command::Validate { input } => {
            let doc = api::read_file(&input, &conf)?;
            let report = api::validate(&doc, &conf)?;
            let warnings = report.warnings().count();
            if warnings > 0 {
                println!("{}: valid ({} warnings)", input.display(), warnings);
            } else {
                println!("{}: valid", input.display());
            }
        }

        Command::Optimize { input, output } => {
            let mut doc = api::read_validated_file(&input, &conf)?;
            api::optimize(&mut doc)?;
            api::write_file(&doc, &conf, out_or(&output, &input))?;
        }

        Command::Split {
            input,
            out_dir,
            span,
        } => {
            let doc = api::read_validated_file(&input, &conf)?;
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "out".to_string());
            std::fs::create_dir_all(&out_dir)?;
            for (index, part) in api::split(&doc, span)?.iter().enumerate() {
                let path = out_dir.join(format!("{}_{}.pdf", stem, index + 1));
                api::write_file(part, &conf, path)?;
            }
        }

        Command::Merge { output, inputs } => {
            let mut docs = Vec::with_capacity(inputs.len());
            for path in &inputs {
                docs.push(api::read_validated_file(path, &conf)?);
            }
            let merged = api::merge(docs)?;
            api::write_file(&merged, &conf, output)?;
        }

        Command::Extract {
            input,
            out_dir,
            pages,
        } => {
            let doc = api::read_validated_file(&input, &conf)?;
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "page".to_string());
            std::fs::create_dir_all(&out_dir)?;
            for index in api::select_pages(&doc, &pages)? {
                let single = api::trim(&doc, &(index + 1).to_string())?;
                let path = out_dir.join(format!("{}_page_{}.pdf", stem, index + 1));
                api::write_file(&single, &conf, path)?;
            }
        }

        Command::Trim {
            input,
            output,
            pages,
        } => {
            let doc = api::read_validated_file(&input, &conf)?;
            let trimmed = api::trim(&doc, &pages)?;
            api::write_file(&trimmed, &conf, output)?;
        }

        Command::Rotate {
            input,
            rotation,
            pages,
            output,
        } => {
            let mut doc = api::read_validated_file(&input, &conf)?;
            api::rotate(&mut doc, &pages, rotation)?;
            api::write_file(&doc, &conf, out_or(&output, &input))?;
        }

        Command::Pages { action } => match action {
            PagesAction::Insert {
                input,
                output,
                pages,
            } => {
                let mut doc = api::read_validated_file(&input, &conf)?;
                api::insert_pages(&mut doc, &pages)?;
                api::write_file(&doc, &conf, output)?;
            }
            PagesAction::Remove {
                input,
                output,
                pages,
            } => {
                let doc = api::read_validated_file(&input, &conf)?;
                let kept = api::remove_pages(&doc, &pages)?;
                api::write_file(&kept, &conf, output)?;
            }
        },

        Command::Attach { action } => match action {
            AttachAction::List { input } => {
                let doc = api::read_validated_file(&input, &conf)?;
                for name in api::list_attachments(&doc)? {
                    println!("{}", name);
                }
            }
            AttachAction::Add {
                input,
                files,
                output,
            } => {
                let mut doc = api::read_validated_file(&input, &conf)?;
                for file in &files {
                    let payload = std::fs::read(file)?;
                    let name = file
                        .file_name()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "attachment".to_string());
                    api::add_attachment(&mut doc, &name, &payload)?;
                }
                api::write_file(&doc, &conf, out_or(&output, &input))?;
            }
            AttachAction::Remove {
                input,
                names,
                output,
            } => {
                let mut doc = api::read_validated_file(&input, &conf)?;
                let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
                api::remove_attachments(&mut doc, &names)?;
                api::write_file(&doc, &conf, out_or(&output, &input))?;
            }
            AttachAction::Extract {
                input,
                out_dir,
                names,
            } => {
                let doc = api::read_validated_file(&input, &conf)?;
                std::fs::create_dir_all(&out_dir)?;
                let names = if names.is_empty() {
                    api::list_attachments(&doc)?
                } else {
                    names
                };
                for name in names {
                    let payload = api::extract_attachment(&doc, &name)?;
                    std::fs::write(out_dir.join(&name), payload)?;
                }
            }
        },

        Command::Perm { action } => match action {
            PermAction::List { input } => {
                let doc = api::read_validated_file(&input, &conf)?;
                match api::list_permissions(&doc) {
                    Some(perms) => println!("{}", perms),
                    None => println!("not encrypted: full access"),
                }
            }
            PermAction::Set {
                input,
                perms,
                output,
            } => {
                let mut doc = api::read_validated_file(&input, &conf)?;
                api::set_permissions(&mut doc, parse_perms(&perms)?)?;
                api::write_file(&doc, &conf, out_or(&output, &input))?;
            }
        },

        Command::Encrypt {
            input,
            output,
            key_length,
            no_aes,
            perms,
        } => {
            let mut conf = conf;
            conf.encrypt_key_length = key_length;
            conf.encrypt_using_aes = !no_aes;
            conf.permissions = parse_perms(&perms)?;
            let mut doc = api::read_validated_file(&input, &conf)?;
            api::encrypt(&mut doc, &conf)?;
            api::write_file(&doc, &conf, out_or(&output, &input))?;
        }

        Command::Decrypt { input, output } => {
            let mut doc = api::read_validated_file(&input, &conf)?;
            api::decrypt(&mut doc)?;
            api::write_file(&doc, &conf, out_or(&output, &input))?;
        }

        Command::Changeupw {
            input,
            old_pw,
            new_pw,
            output,
        } => {
            let mut conf = conf;
            conf.user_pw = old_pw;
            conf.user_pw_new = Some(new_pw);
            let mut doc = api::read_validated_file(&input, &conf)?;
            api::change_user_password(&mut doc, &conf)?;
            api::write_file(&doc, &conf, out_or(&output, &input))?;
        }

        Command::Changeopw {
            input,
            old_pw,
            new_pw,
            output,
        } => {
            let mut conf = conf;
            conf.owner_pw = old_pw;
            conf.owner_pw_new = Some(new_pw);
            let mut doc = api::read_validated_file(&input, &conf)?;
            api::change_owner_password(&mut doc, &conf)?;
            api::write_file(&doc, &conf, out_or(&output, &input))?;
        }

        Command::Info { input, json } => {
            let doc = api::read_validated_file(&input, &conf)?;
            let info = api::info(&doc)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info).unwrap_or_default());
            } else {
                print!("{}", info.render());
            }
        }

        Command::Version => {
            println!("pdfmill {}", env!("CARGO_PKG_VERSION"));
        }

        Command::Paper => {
            for &(name, width, height) in PAPER_SIZES {
                println!("{:<8} {:>7.1} x {:>7.1} pt", name, width, height);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unambiguous_prefix_expands() {
        let resolved = resolve_command_prefix(argv(&["pdfmill", "val", "x.pdf"]));
        assert_eq!(resolved[1], "validate");
        let resolved = resolve_command_prefix(argv(&["pdfmill", "enc", "x.pdf"]));
        assert_eq!(resolved[1], "encrypt");
    }

    #[test]
    fn ambiguous_prefix_is_left_alone() {
        // "ch" matches changeupw and changeopw
        let resolved = resolve_command_prefix(argv(&["pdfmill", "ch", "x.pdf"]));
        assert_eq!(resolved[1], "ch");
    }

    #[test]
    fn flags_and_exact_names_pass_through() {
        let resolved = resolve_command_prefix(argv(&["pdfmill", "--help"]));
        assert_eq!(resolved[1], "--help");
        let resolved = resolve_command_prefix(argv(&["pdfmill", "merge"]));
        assert_eq!(resolved[1], "merge");
    }

    #[test]
    fn perm_spec_parsing() {
        assert_eq!(parse_perms("all").unwrap(), Permissions::all());
        assert_eq!(parse_perms("none").unwrap(), Permissions::none());
        let p = parse_perms("print,copy").unwrap();
        assert!(p.allows(PERM_PRINT));
        assert!(p.allows(PERM_COPY));
        assert!(!p.allows(PERM_MODIFY));
        assert!(parse_perms("fly").is_err());
    }
}
