//! Subcommands and their implementations.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use mindjourney_client::{HttpBackend, SessionState};
use mindjourney_core::{
  category::{CategoryType, NewCategory},
  entry::{EntryPatch, NewDocument},
  face::{FacePatch, NewFace},
  id::{CategoryId, DocumentId, EntryId, FaceId},
  query::CategoryLookup,
};
use mindjourney_sync::{
  EntryDraft, FilterSelection, Journal, PollState, SuggestionInputs, SuggestionOutcome,
};

use crate::{render, settings::Settings};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Log in and store the bearer credential.
  Login {
    #[arg(short, long)]
    username: String,
    #[arg(long, env = "MJ_PASSWORD", hide_env_values = true)]
    password: String,
  },
  Logout,
  /// Your own entries, newest first.
  List,
  Show {
    id: i64,
  },
  /// Wait until an entry's insights are processed, then show it.
  Watch {
    id:      i64,
    /// Give up after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,
  },
  /// Write a new entry.
  New {
    content:     String,
    #[arg(long)]
    title:       Option<String>,
    #[arg(long)]
    public:      bool,
    /// Attach an existing face (repeatable).
    #[arg(long = "face", value_name = "ID")]
    faces:       Vec<i64>,
    /// Upload a document after the entry is created (repeatable).
    #[arg(long = "file", value_name = "PATH")]
    files:       Vec<PathBuf>,
    /// Attach suggested faces that already exist.
    #[arg(long)]
    suggest:     bool,
    /// With `--suggest`, also create proposed faces that do not exist yet.
    #[arg(long, requires = "suggest")]
    create_new:  bool,
    /// Wait for processing to finish.
    #[arg(long)]
    wait:        bool,
  },
  Edit {
    id:      i64,
    #[arg(long)]
    title:   Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long, conflicts_with = "private")]
    public:  bool,
    #[arg(long)]
    private: bool,
    /// Replace the entry's faces (repeatable).
    #[arg(long = "face", value_name = "ID")]
    faces:   Option<Vec<i64>>,
  },
  Delete {
    id: i64,
  },
  /// Re-run insight extraction.
  Reprocess {
    id:   i64,
    #[arg(long)]
    wait: bool,
  },
  Attach {
    id:   i64,
    file: PathBuf,
  },
  Detach {
    id:       i64,
    document: i64,
  },
  /// Public entries from everyone, optionally filtered.
  Public {
    #[arg(long = "face", value_name = "ID")]
    faces:      Vec<i64>,
    #[arg(long = "category", value_name = "ID")]
    categories: Vec<i64>,
  },
  Search {
    query: String,
  },
  /// Entries tagged with a face.
  ByFace {
    id: i64,
  },
  /// Entries with an insight in the named category.
  ByCategory {
    name: String,
    #[arg(long = "type")]
    kind: Option<CategoryType>,
  },
  Faces {
    #[command(subcommand)]
    action: Option<FaceCommand>,
  },
  Categories {
    #[arg(long = "type")]
    kind: Option<CategoryType>,
  },
  NewCategory {
    name:        String,
    #[arg(long = "type", default_value = "other")]
    kind:        CategoryType,
    #[arg(long, default_value = "")]
    description: String,
  },
  /// Face suggestions for some text.
  Suggest {
    content: String,
    #[arg(long, default_value = "")]
    title:   String,
  },
  /// Print the effective configuration.
  Config,
}

#[derive(Subcommand, Debug)]
pub enum FaceCommand {
  /// Every face.
  List,
  /// Faces you subscribe to.
  Mine,
  New {
    name:        String,
    #[arg(long, default_value = "")]
    icon:        String,
    #[arg(long, default_value = "")]
    description: String,
  },
  Edit {
    id:          i64,
    #[arg(long)]
    name:        Option<String>,
    #[arg(long)]
    icon:        Option<String>,
    #[arg(long)]
    description: Option<String>,
  },
  Subscribe {
    id: i64,
  },
  Unsubscribe {
    id: i64,
  },
}

pub async fn run(command: Command, journal: &Journal<HttpBackend>, settings: &Settings) -> Result<()> {
  match command {
    Command::Login { username, password } => {
      journal.backend().login(&username, &password).await.context("login failed")?;
      println!("logged in as {username}");
    }
    Command::Logout => {
      journal.backend().logout().await;
      println!("logged out");
    }
    Command::List => print!("{}", render::entry_list(&journal.entries().await?)),
    Command::Show { id } => print!("{}", render::entry_detail(&journal.entry(EntryId(id)).await?)),
    Command::Watch { id, timeout } => watch(journal, EntryId(id), timeout).await?,
    Command::New { content, title, public, faces, files, suggest, create_new, wait } => {
      let mut draft = EntryDraft::new(content);
      draft.title = title.unwrap_or_default();
      draft.is_public = public;
      for id in faces {
        draft.select_face(FaceId(id));
      }
      for path in files {
        draft.attach(read_document(path).await?)?;
      }
      if suggest {
        apply_suggestions(journal, &mut draft, create_new).await?;
      }

      let created = journal.submit_draft(&draft).await?;
      println!("created entry {}", created.entry.id);
      for doc in &created.documents {
        println!("  attached {} (id {})", doc.filename, doc.id);
      }
      if let Some(failure) = created.upload_error {
        eprintln!("upload of {} failed: {}", failure.filename, failure.error);
        if !failure.skipped.is_empty() {
          eprintln!("not uploaded: {}", failure.skipped.join(", "));
        }
      }
      if wait {
        watch(journal, created.entry.id, None).await?;
      }
    }
    Command::Edit { id, title, content, public, private, faces } => {
      let patch = EntryPatch {
        title,
        content,
        is_public: (public || private).then_some(public),
        face_ids: faces.map(|ids| ids.into_iter().map(FaceId).collect()),
      };
      let entry = journal.update_entry(EntryId(id), patch).await?;
      print!("{}", render::entry_detail(&entry));
    }
    Command::Delete { id } => {
      journal.delete_entry(EntryId(id)).await?;
      println!("deleted entry {id}");
    }
    Command::Reprocess { id, wait } => {
      journal.reprocess_entry(EntryId(id)).await?;
      println!("reprocessing entry {id}");
      if wait {
        watch(journal, EntryId(id), None).await?;
      }
    }
    Command::Attach { id, file } => {
      let doc = journal.upload_document(EntryId(id), read_document(file).await?).await?;
      println!("attached {} (id {})", doc.filename, doc.id);
    }
    Command::Detach { id, document } => {
      journal.delete_document(EntryId(id), DocumentId(document)).await?;
      println!("removed document {document}");
    }
    Command::Public { faces, categories } => {
      let mut selection = FilterSelection::default();
      for id in faces {
        selection.toggle_face(FaceId(id));
      }
      for id in categories {
        selection.toggle_category(CategoryId(id));
      }
      print!("{}", render::entry_list(&journal.public_entries(&selection.signature()).await?));
    }
    Command::Search { query } => print!("{}", render::entry_list(&journal.search(&query).await?)),
    Command::ByFace { id } => {
      print!("{}", render::entry_list(&journal.entries_by_face(FaceId(id)).await?));
    }
    Command::ByCategory { name, kind } => {
      let lookup = CategoryLookup { name, category_type: kind };
      print!("{}", render::entry_list(&journal.entries_by_category(lookup).await?));
    }
    Command::Faces { action } => faces(journal, action.unwrap_or(FaceCommand::List)).await?,
    Command::Categories { kind } => {
      let categories = match kind {
        Some(kind) => journal.categories_by_type(kind).await?,
        None => journal.categories().await?,
      };
      print!("{}", render::category_list(&categories));
    }
    Command::NewCategory { name, kind, description } => {
      let category = journal
        .create_category(NewCategory { name, category_type: kind, description })
        .await?;
      println!("created category {} ({})", category.id, category.category_type);
    }
    Command::Suggest { content, title } => {
      let suggestions = journal.suggest_faces(&SuggestionInputs::new(title, content)).await?;
      print!("{}", render::suggestion_list(&suggestions));
    }
    Command::Config => print!("{}", settings.to_toml()?),
  }
  Ok(())
}

async fn faces(journal: &Journal<HttpBackend>, action: FaceCommand) -> Result<()> {
  match action {
    FaceCommand::List => print!("{}", render::face_list(&journal.faces().await?)),
    FaceCommand::Mine => print!("{}", render::face_list(&journal.subscribed_faces().await?)),
    FaceCommand::New { name, icon, description } => {
      let face = journal.create_face(NewFace { name, icon, description }).await?;
      println!("created face {} {} {}", face.id, face.icon, face.name);
    }
    FaceCommand::Edit { id, name, icon, description } => {
      let face = journal.update_face(FaceId(id), FacePatch { name, icon, description }).await?;
      println!("updated face {} {} {}", face.id, face.icon, face.name);
    }
    FaceCommand::Subscribe { id } => {
      journal.subscribe_face(FaceId(id)).await?;
      println!("subscribed to face {id}");
    }
    FaceCommand::Unsubscribe { id } => {
      journal.unsubscribe_face(FaceId(id)).await?;
      println!("unsubscribed from face {id}");
    }
  }
  Ok(())
}

async fn apply_suggestions(
  journal: &Journal<HttpBackend>,
  draft: &mut EntryDraft,
  create_new: bool,
) -> Result<()> {
  let suggestions = journal.suggest_faces(&draft.suggestion_inputs()).await?;
  for suggestion in &suggestions {
    match draft.accept_suggestion(suggestion) {
      SuggestionOutcome::Added(id) => println!("  + {} {} ({id})", suggestion.icon, suggestion.name),
      SuggestionOutcome::AlreadySelected(_) => {}
      SuggestionOutcome::NeedsCreation if create_new => {
        let face = journal.create_face_from_suggestion(draft, suggestion).await?;
        println!("  + {} {} (new face {})", face.icon, face.name, face.id);
      }
      SuggestionOutcome::NeedsCreation => {
        println!("  ? {} {} (not a face yet; pass --create-new)", suggestion.icon, suggestion.name);
      }
    }
  }
  Ok(())
}

async fn read_document(path: PathBuf) -> Result<NewDocument> {
  let data = tokio::fs::read(&path).await.with_context(|| format!("failed to read {}", path.display()))?;
  let filename = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .with_context(|| format!("{} has no file name", path.display()))?;
  Ok(NewDocument::new(filename, data))
}

async fn watch(journal: &Journal<HttpBackend>, id: EntryId, timeout: Option<u64>) -> Result<()> {
  let mut view = journal.observe_entry(id);
  let mut session = journal.backend().credentials().subscribe();
  let deadline = async {
    match timeout {
      Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
      None => std::future::pending().await,
    }
  };

  if view.state() == PollState::Polling {
    eprintln!("waiting for insights on entry {id}…");
  }
  tokio::select! {
    settled = view.wait_settled() => {
      let entry = settled.with_context(|| format!("watching entry {id}"))?;
      print!("{}", render::entry_detail(&entry));
      Ok(())
    }
    _ = session.wait_for(|s| *s != SessionState::Authenticated) => {
      bail!("session expired while waiting; run `mj login`")
    }
    _ = deadline => bail!("entry {id} was still processing after {}s", timeout.unwrap_or_default()),
    _ = tokio::signal::ctrl_c() => bail!("interrupted"),
  }
}
