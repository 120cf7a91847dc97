//! FTP control-channel replies (RFC 959 §4.2)

use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::FtpError;

/// A complete (possibly multi-line) server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    /// 1yz: action started, expect another reply
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2yz: action completed
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3yz: more information needed
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn into_error(self) -> FtpError {
        FtpError::Reply {
            code: self.code,
            message: self.text,
        }
    }
}

/// Split a reply line into its code and the separator that follows it
fn parse_line(line: &str) -> Result<(u16, Option<char>, &str), FtpError> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(FtpError::Malformed(line.to_string()));
    }
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| FtpError::Malformed(line.to_string()))?;
    let sep = line[3..].chars().next();
    let text = line.get(4..).unwrap_or("");
    Ok((code, sep, text))
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, FtpError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(FtpError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "control connection closed",
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Read one reply from the control connection.
///
/// A multi-line reply starts with `xyz-` and ends at the first line that
/// starts with the same code followed by a space, or is the bare code.
pub async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Reply, FtpError> {
    let first = read_line(reader).await?;
    let (code, sep, text) = parse_line(&first)?;
    let mut text = text.to_string();

    if sep == Some('-') {
        let bare = first[..3].to_string();
        let terminator = format!("{} ", bare);
        loop {
            let line = read_line(reader).await?;
            if line == bare {
                break;
            }
            if line.starts_with(&terminator) {
                text.push('\n');
                text.push_str(&line[4..]);
                break;
            }
            text.push('\n');
            text.push_str(&line);
        }
    }

    Ok(Reply { code, text })
}

/// Port from a 229 reply: `Entering Extended Passive Mode (|||6446|)`
pub fn parse_epsv(text: &str) -> Option<u16> {
    let start = text.find('(')?;
    let end = text[start..].find(')')? + start;
    let inner = &text[start + 1..end];
    let delim = inner.chars().next()?;
    let fields: Vec<&str> = inner.split(delim).collect();
    // <d><d><d><port><d> splits into ["", "", "", port, ""]
    if fields.len() != 5 {
        return None;
    }
    fields[3].parse().ok()
}

/// Address from a 227 reply: `Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
///
/// Some servers omit the parentheses, so the first run of six
/// comma-separated numbers is used.
pub fn parse_pasv(text: &str) -> Option<SocketAddrV4> {
    let candidate = match (text.find('('), text.find(')')) {
        (Some(start), Some(end)) if end > start => &text[start + 1..end],
        _ => text
            .split_whitespace()
            .find(|t| t.matches(',').count() == 5)?
            .trim_end_matches('.'),
    };

    let nums: Vec<u8> = candidate
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;
    if nums.len() != 6 {
        return None;
    }

    let ip = Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
    let port = (nums[4] as u16) << 8 | nums[5] as u16;
    Some(SocketAddrV4::new(ip, port))
}
