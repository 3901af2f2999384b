use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use uvcs::history;
use uvcs::materialize;
use uvcs::{
    AccessLevel, CommitId, CommitRequest, CommitWriter, Error, IncomingFile, OpenOptions,
    Repository, Result, Store, StoredAccess, UserId,
};

#[derive(Parser)]
#[command(name = "uvcs")]
#[command(about = "A minimal version-control backend", long_about = None)]
struct Cli {
    /// Path to the store (a bare git repository)
    #[arg(long, env = "UVCS_STORE")]
    store: PathBuf,

    /// Acting user id
    #[arg(long, env = "UVCS_USER", default_value_t = 0)]
    user: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty store
    Init,

    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Manage access grants on a repository
    Access {
        #[command(subcommand)]
        command: AccessCommands,
    },

    /// Manage branches of a repository
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },

    /// Commit files read from disk
    Commit {
        /// Repository name
        repo: String,

        /// Commit message
        #[arg(short, long)]
        message: String,

        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,

        /// Append the commit to this branch
        #[arg(long)]
        branch: Option<String>,

        /// Paths to delete
        #[arg(long = "delete")]
        deletions: Vec<String>,

        /// Files to commit, stored under their path as given
        files: Vec<PathBuf>,
    },

    /// Print a file's content
    Show {
        repo: String,
        path: String,

        /// Show the file as of this commit id
        #[arg(long)]
        at: Option<u64>,
    },

    /// Print the latest content of every live file
    Snapshot { repo: String },

    /// Print the commit log, newest first
    Log { repo: String },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Create a repository owned by the acting user
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// List repositories the acting user can access
    List,
    /// Mark a repository inactive
    Deactivate { name: String },
}

#[derive(Subcommand)]
enum AccessCommands {
    /// Grant read or write access
    Grant {
        repo: String,
        user: u64,
        /// read or write
        level: String,
    },
    /// Revoke a user's grant
    Revoke { repo: String, user: u64 },
    /// List grants
    List { repo: String },
}

#[derive(Subcommand)]
enum BranchCommands {
    Create {
        repo: String,
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    Delete { repo: String, name: String },
    List { repo: String },
    /// List a branch's commits, newest first
    Commits { repo: String, name: String },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let user = UserId(cli.user);
    let create = matches!(cli.command, Commands::Init);
    let store = Store::open(
        &cli.store,
        OpenOptions {
            create,
            ..Default::default()
        },
    )?;

    match cli.command {
        Commands::Init => {
            let path = store.path().display().to_string();
            print_json(&serde_json::json!({ "store": path }))
        }
        Commands::Repo { command } => match command {
            RepoCommands::Create { name, description } => {
                print_json(&store.repositories().create(user, &name, &description)?)
            }
            RepoCommands::List => {
                let rows: Vec<_> = store
                    .repositories()
                    .for_user(user)?
                    .into_iter()
                    .map(|(repo, level)| {
                        serde_json::json!({ "repository": repo, "access": level })
                    })
                    .collect();
                print_json(&rows)
            }
            RepoCommands::Deactivate { name } => {
                let repo = store.repositories().find(user, &name)?;
                store.repositories().deactivate(repo.id)?;
                print_json(&serde_json::json!({ "deactivated": repo.id }))
            }
        },
        Commands::Access { command } => match command {
            AccessCommands::Grant { repo, user: grantee, level } => {
                let repo = store.repositories().find(user, &repo)?;
                let level: AccessLevel = level.parse()?;
                print_json(&store.grants(repo.id).grant(UserId(grantee), level)?)
            }
            AccessCommands::Revoke { repo, user: grantee } => {
                let repo = store.repositories().find(user, &repo)?;
                store.grants(repo.id).revoke(UserId(grantee))?;
                print_json(&serde_json::json!({ "revoked": grantee }))
            }
            AccessCommands::List { repo } => {
                let repo = store.repositories().find(user, &repo)?;
                print_json(&store.grants(repo.id).list()?)
            }
        },
        Commands::Branch { command } => match command {
            BranchCommands::Create { repo, name, description } => {
                let repo = writable(&store, user, &repo)?;
                print_json(&store.branches(repo.id).create(&name, &description)?)
            }
            BranchCommands::Delete { repo, name } => {
                let repo = writable(&store, user, &repo)?;
                store.branches(repo.id).delete(&name)?;
                print_json(&serde_json::json!({ "deleted": name }))
            }
            BranchCommands::List { repo } => {
                let repo = readable(&store, user, &repo)?;
                print_json(&store.branches(repo.id).list()?)
            }
            BranchCommands::Commits { repo, name } => {
                let repo = readable(&store, user, &repo)?;
                print_json(&store.branches(repo.id).commits(&name)?)
            }
        },
        Commands::Commit {
            repo,
            message,
            tags,
            branch,
            deletions,
            files,
        } => {
            let mut request = CommitRequest::new(repo, message).tags(&tags);
            request.branch = branch;
            for path in &files {
                let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
                request
                    .files
                    .push(IncomingFile::new(path.to_string_lossy(), data));
            }
            request
                .files
                .extend(deletions.into_iter().map(IncomingFile::deletion));
            let writer = CommitWriter::new(store.clone(), StoredAccess::new(store.clone()));
            print_json(&writer.commit(user, &request)?)
        }
        Commands::Show { repo, path, at } => {
            let repo = readable(&store, user, &repo)?;
            let snap = store.snapshot()?;
            let file = match at {
                Some(at) => history::resolve_at(&snap, repo.id, &path, CommitId(at))?,
                None => history::resolve(&snap, repo.id, &path)?,
            };
            print_json(&ShownFile::new(&file))
        }
        Commands::Snapshot { repo } => {
            let repo = readable(&store, user, &repo)?;
            print_json(&materialize::snapshot(&store.snapshot()?, repo.id)?)
        }
        Commands::Log { repo } => {
            let repo = readable(&store, user, &repo)?;
            print_json(&history::commit_log(&store.snapshot()?, repo.id)?)
        }
    }
}

#[derive(Serialize)]
struct ShownFile<'a> {
    path: &'a str,
    is_code: bool,
    is_binary: bool,
    commit: CommitId,
    /// Text verbatim; binary content is replaced by its size.
    content: Option<&'a str>,
    size: usize,
}

impl<'a> ShownFile<'a> {
    fn new(file: &'a history::ResolvedFile) -> Self {
        Self {
            path: &file.path,
            is_code: file.is_code,
            is_binary: file.is_binary,
            commit: file.commit,
            content: file.text().ok(),
            size: file.content.len(),
        }
    }
}

/// The repository `name` the user can see, preferring their own.
fn readable(store: &Store, user: UserId, name: &str) -> Result<Repository> {
    store
        .repositories()
        .for_user(user)?
        .into_iter()
        .filter(|(repo, _)| repo.name == name)
        .max_by_key(|(repo, level)| (*level, std::cmp::Reverse(repo.id)))
        .map(|(repo, _)| repo)
        .ok_or_else(|| Error::not_found(format!("repository '{}'", name)))
}

fn writable(store: &Store, user: UserId, name: &str) -> Result<Repository> {
    let repo = readable(store, user, name)?;
    let level = uvcs::access::level_of(&store.snapshot()?, &repo, user)?;
    if !level.map(AccessLevel::can_write).unwrap_or(false) {
        return Err(Error::permission(format!(
            "user {} has no write access to repository '{}'",
            user, name
        )));
    }
    Ok(repo)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
