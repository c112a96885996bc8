//! Command-line entry points.

use tokio::io::AsyncWriteExt as _;

use crate::prelude::*;

pub mod extract;
pub mod schema;
pub mod serve;

/// Write `data` to `output_path`, or to standard output if it is `None`.
async fn write_output(output_path: Option<&Path>, data: &[u8]) -> Result<()> {
    match output_path {
        Some(path) => tokio::fs::write(path, data)
            .await
            .with_context(|| format!("failed to write {:?}", path.display())),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(data)
                .await
                .context("failed to write to stdout")?;
            stdout.flush().await.context("failed to flush stdout")
        }
    }
}
