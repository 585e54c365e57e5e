use std::fmt;

use super::ParseError;

/// A domain name as an ordered list of labels, root last and not stored.
/// The empty label vector is the root name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Name {
    labels: Vec<String>,
}

impl Name {
    pub fn root() -> Self {
        Name { labels: Vec::new() }
    }

    pub fn from_labels(labels: Vec<String>) -> Self {
        Name {
            labels: labels.into_iter().filter(|l| !l.is_empty()).collect(),
        }
    }

    /// Parse a name from presentation format; a trailing dot is accepted and
    /// ignored. Label and name length limits are enforced.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let trimmed = s.trim_end_matches('.');
        if trimmed.is_empty() {
            return Ok(Name::root());
        }
        let labels: Vec<String> = trimmed.split('.').map(|l| l.to_string()).collect();
        for label in &labels {
            if label.is_empty() || label.len() > 63 {
                return Err(ParseError::InvalidLabel);
            }
        }
        let name = Name { labels };
        if name.wire_len() > 255 {
            return Err(ParseError::InvalidLabel);
        }
        Ok(name)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_labels(&self) -> u8 {
        self.labels.len() as u8
    }

    /// Encoded length on the wire, including the root byte
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Strip the leftmost label; the root name is its own parent.
    pub fn parent(&self) -> Name {
        if self.labels.is_empty() {
            return Name::root();
        }
        Name {
            labels: self.labels[1..].to_vec(),
        }
    }

    /// Prefix a single label, e.g. the hashed owner of an NSEC3 record.
    pub fn prepend(&self, label: &str) -> Name {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(label.to_string());
        labels.extend_from_slice(&self.labels);
        Name { labels }
    }

    pub fn to_lowercase(&self) -> Name {
        Name {
            labels: self.labels.iter().map(|l| l.to_lowercase()).collect(),
        }
    }

    /// Lookup key form: lower-case, no trailing dot ("" for the root)
    pub fn lookup_key(&self) -> String {
        self.labels
            .iter()
            .map(|l| l.to_lowercase())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Append the uncompressed wire form to `buf`; canonical form lowercases
    /// every label (RFC 4034 section 6.2).
    pub fn write_wire(&self, buf: &mut Vec<u8>, canonical: bool) {
        for label in &self.labels {
            if canonical {
                let lower = label.to_lowercase();
                buf.push(lower.len() as u8);
                buf.extend_from_slice(lower.as_bytes());
            } else {
                buf.push(label.len() as u8);
                buf.extend_from_slice(label.as_bytes());
            }
        }
        buf.push(0);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        for label in &self.labels {
            write!(f, "{}.", label)?;
        }
        Ok(())
    }
}

/// Parse an uncompressed or pointer-compressed name out of `buf` starting at
/// `offset`. Returns the name and the offset just past it in the original
/// stream (pointers do not advance past their two bytes).
pub fn read_name_at(buf: &[u8], offset: usize) -> Result<(Name, usize), ParseError> {
    let mut labels = Vec::new();
    let mut pos = offset;
    let mut end = None;
    let mut jumps = 0;

    loop {
        let first = *buf.get(pos).ok_or(ParseError::InvalidLabel)?;

        if first == 0 {
            if end.is_none() {
                end = Some(pos + 1);
            }
            break;
        }

        if (first & 0xC0) == 0xC0 {
            let second = *buf.get(pos + 1).ok_or(ParseError::InvalidLabel)?;
            let target = (((first as usize) & 0x3F) << 8) | second as usize;
            if end.is_none() {
                end = Some(pos + 2);
            }
            jumps += 1;
            if jumps > 100 || target >= buf.len() {
                return Err(ParseError::InvalidLabel);
            }
            pos = target;
            continue;
        }

        if first > 63 {
            return Err(ParseError::InvalidLabel);
        }

        let start = pos + 1;
        let stop = start + first as usize;
        if stop > buf.len() {
            return Err(ParseError::InvalidLabel);
        }
        let label =
            String::from_utf8(buf[start..stop].to_vec()).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label);
        pos = stop;

        if labels.len() > 128 {
            return Err(ParseError::InvalidLabel);
        }
    }

    Ok((Name { labels }, end.unwrap_or(pos + 1)))
}
