use anyhow::Result;
use clap::Subcommand;
use sb_core::{bus::Notice, Bookmark, BookmarkId};
use tokio::{signal, sync::broadcast::error::RecvError};

use crate::context::{Context, OutputFormat};
use crate::util::prelude::*;

#[derive(Subcommand, Debug)]
pub enum BookmarksCmd {
	/// List your bookmarks, newest first
	List,
	/// Add a bookmark
	Add { url: String, title: String },
	/// Delete a bookmark by ID
	Delete { id: String },
	/// Keep the list on screen and follow changes live until Ctrl-C
	Watch,
}

pub async fn run(ctx: &Context, cmd: BookmarksCmd) -> Result<()> {
	match cmd {
		BookmarksCmd::List => {
			let session = ctx.require_session().await?;
			let out = ctx.node.sync().load(&session).await?;

			print_output!(ctx, &out, |bookmarks: &Vec<Bookmark>| {
				print_bookmarks(bookmarks);
			});
		}
		BookmarksCmd::Add { url, title } => {
			ctx.require_session().await?;
			ctx.node.bookmarks().add(&url, &title).await?;

			print_output!(ctx, &serde_json::json!({ "added": true }), |_| {
				println!("Bookmark added");
			});
		}
		BookmarksCmd::Delete { id } => {
			ctx.require_session().await?;
			let id = BookmarkId::new(id);
			ctx.node.bookmarks().delete(&id).await?;

			print_output!(ctx, &serde_json::json!({ "deleted": id }), |_| {
				println!("Bookmark {id} deleted");
			});
		}
		BookmarksCmd::Watch => watch(ctx).await?,
	}

	Ok(())
}

async fn watch(ctx: &Context) -> Result<()> {
	let mut notices = ctx.node.bus().subscribe();
	let running = ctx.node.start().await;

	let ctrl_c = signal::ctrl_c();
	tokio::pin!(ctrl_c);

	loop {
		tokio::select! {
			res = &mut ctrl_c => {
				res?;
				break;
			}
			notice = notices.recv() => match notice {
				Ok(notice) => render(ctx, &notice).await?,
				Err(RecvError::Lagged(_)) => render(ctx, &Notice::Reset).await?,
				Err(RecvError::Closed) => break,
			}
		}
	}

	ctx.node.shutdown().await;
	running.abort();

	Ok(())
}

async fn render(ctx: &Context, notice: &Notice) -> Result<()> {
	match ctx.format {
		OutputFormat::Json => {
			let bookmarks = ctx.node.sync().records().await;
			print_json_line(&serde_json::json!({ "notice": notice, "bookmarks": bookmarks }))?;
		}
		OutputFormat::Human => match notice {
			Notice::Phase { phase } => println!("-- {phase:?}"),
			Notice::SnapshotLoading => println!("Loading bookmarks..."),
			Notice::SnapshotFailed { reason } => println!("Could not load bookmarks: {reason}"),
			Notice::FeedClosed => println!("Live updates stopped, the list may be out of date"),
			Notice::SnapshotLoaded { .. } | Notice::Changed { .. } | Notice::Reset => {
				print_bookmarks(&ctx.node.sync().records().await);
			}
		},
	}

	Ok(())
}

fn print_bookmarks(bookmarks: &[Bookmark]) {
	if bookmarks.is_empty() {
		println!("No bookmarks yet");
		return;
	}

	println!("{} bookmark(s)", bookmarks.len());
	for b in bookmarks {
		println!(
			"- {} {}\n  {} ({})",
			b.id,
			b.title,
			b.url,
			b.created_at.format("%Y-%m-%d %H:%M")
		);
	}
}
