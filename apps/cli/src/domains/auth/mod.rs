use anyhow::{Context as _, Result};
use clap::Subcommand;
use serde::Serialize;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::context::Context;
use crate::util::prelude::*;

const DEFAULT_REDIRECT: &str = "http://localhost:3000/auth/callback";

#[derive(Subcommand, Debug)]
pub enum AuthCmd {
	/// Sign in with Google
	Login {
		/// URL the browser was redirected to after signing in, asked for if missing
		#[arg(long)]
		callback: Option<String>,
		/// Where the identity service should send the browser back to
		#[arg(long, default_value = DEFAULT_REDIRECT)]
		redirect_to: String,
	},
	/// Sign out and forget the persisted session
	Logout,
	/// Show who is signed in
	Whoami,
}

#[derive(Debug, Serialize)]
struct WhoamiOutput {
	user_id: Uuid,
	email: Option<String>,
	expires_at: i64,
}

pub async fn run(ctx: &Context, cmd: AuthCmd) -> Result<()> {
	match cmd {
		AuthCmd::Login {
			callback,
			redirect_to,
		} => {
			let url = ctx.node.auth().begin_sign_in(&redirect_to).await?;

			let callback = match callback {
				Some(callback) => callback,
				None => {
					eprintln!("Open this URL in your browser to sign in:\n\n  {url}\n");
					eprintln!("Then paste the URL you were redirected to:");

					BufReader::new(io::stdin())
						.lines()
						.next_line()
						.await?
						.context("No callback URL given")?
				}
			};

			let session = ctx.node.auth().complete_sign_in(&callback).await?;

			let out = WhoamiOutput {
				user_id: session.user.id,
				email: session.user.email,
				expires_at: session.expires_at,
			};
			print_output!(ctx, &out, |o: &WhoamiOutput| {
				println!("Signed in as {}", o.email.as_deref().unwrap_or("(no email)"));
			});
		}
		AuthCmd::Logout => {
			ctx.require_session().await?;
			ctx.node.auth().sign_out().await?;

			print_output!(ctx, &serde_json::json!({ "signed_out": true }), |_| {
				println!("Signed out");
			});
		}
		AuthCmd::Whoami => {
			let session = ctx.require_session().await?;

			let out = WhoamiOutput {
				user_id: session.user.id,
				email: session.user.email,
				expires_at: session.expires_at,
			};
			print_output!(ctx, &out, |o: &WhoamiOutput| {
				println!("User:    {}", o.user_id);
				if let Some(email) = &o.email {
					println!("Email:   {email}");
				}
				let expires = chrono::DateTime::from_timestamp(o.expires_at, 0)
					.map_or_else(|| o.expires_at.to_string(), |at| at.to_rfc3339());
				println!("Expires: {expires}");
			});
		}
	}

	Ok(())
}
