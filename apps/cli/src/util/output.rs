use anyhow::Result;
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

/// Single-line JSON, for streams where every line is one document.
pub fn print_json_line<T: Serialize + ?Sized>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string(value)?);
	Ok(())
}
