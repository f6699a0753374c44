use anyhow::Result;
use sb_core::{Node, Session};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
	Human,
	Json,
}

pub struct Context {
	pub node: Node,
	pub format: OutputFormat,
}

impl Context {
	pub const fn new(node: Node, format: OutputFormat) -> Self {
		Self { node, format }
	}

	/// The persisted session, or an error telling the user to sign in.
	pub async fn require_session(&self) -> Result<Session> {
		self.node
			.auth()
			.restore()
			.await?
			.ok_or_else(|| anyhow::anyhow!("Not signed in. Use 'sb login' to sign in."))
	}
}
