//! Interactive operator prompt.

use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const PROXY_QUESTION: &str = "Do you want to use a proxy? (y/n): ";

/// Ask whether proxies should be used, re-asking until the answer is `y` or `n`.
///
/// Answers are case-insensitive. Running out of input is an error.
pub async fn ask_use_proxy<R>(reader: R) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        eprint!("{PROXY_QUESTION}");
        let _ = io::stderr().flush();

        let Some(line) = lines.next_line().await? else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no answer to the proxy prompt",
            ));
        };
        match line.trim().to_ascii_lowercase().as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => eprintln!("Please answer with y or n."),
        }
    }
}
