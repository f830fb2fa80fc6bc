// ODM Core - OverDrive audiobook download client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! ODM descriptor model
//!
//! An `.odm` file is the XML document a library hands out when a loan is
//! checked out. It identifies the title, tells us where to acquire a
//! license, lists the downloadable formats and their parts, and embeds a
//! second XML document (as CDATA directly under the root) with the book
//! metadata.
//!
//! # Document Layout
//! ```xml
//! <OverDriveMedia id="{MEDIA-ID}">
//!   <License><AcquisitionUrl>https://...</AcquisitionUrl></License>
//!   <DrmInfo><ExpirationDate>...</ExpirationDate></DrmInfo>
//!   <![CDATA[<Metadata><Title>...</Title>...</Metadata>]]>
//!   <Formats>
//!     <Format name="MP3 Audiobook">
//!       <Quality level="High"/>
//!       <Protocols><Protocol method="download" baseurl="https://..."/></Protocols>
//!       <Parts count="2">
//!         <Part number="1" filesize="123" name="Part 1" filename="{ID}Fmt425-Part01.mp3"/>
//!       </Parts>
//!     </Format>
//!   </Formats>
//!   <EarlyReturnURL>https://...</EarlyReturnURL>
//!   <TransactionID>...</TransactionID>
//! </OverDriveMedia>
//! ```

use crate::error::{OdmError, Result};
use crate::file::paths::{is_plain_file_name, sanitize_folder_name};
use crate::xml::{parse_document, XmlElement};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Author used when the metadata lists no creators
pub const UNKNOWN_AUTHOR: &str = "Author Unknown";

/// Quality level of a format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Medium,
    High,
    /// Any other (or missing) level, kept verbatim
    Unknown(String),
}

impl Quality {
    /// Parse the `level` attribute; matching is exact like the vendor apps
    pub fn from_level(level: &str) -> Self {
        match level {
            "Low" => Self::Low,
            "Medium" => Self::Medium,
            "High" => Self::High,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Rank used by format selection; unknown levels rank lowest
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low | Self::Unknown(_) => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

/// One protocol entry of a format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub method: String,
    pub base_url: String,
}

/// One downloadable segment of the work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub number: String,
    /// Declared size in bytes, used as the completion marker
    pub file_size: u64,
    pub name: String,
    /// Vendor filename, appended to the download base URL
    pub file_name: String,
}

impl Part {
    /// Local filename: the final `-`-delimited segment of the vendor filename
    ///
    /// `{ABC-123}Fmt425-Part01.mp3` becomes `Part01.mp3`.
    pub fn local_file_name(&self) -> &str {
        self.file_name.rsplit('-').next().unwrap_or(&self.file_name)
    }
}

/// A downloadable format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub name: String,
    pub quality: Quality,
    /// Protocol entries in document order
    pub protocols: Vec<Protocol>,
    pub parts: Vec<Part>,
}

/// Creator entry from the metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub role: String,
    pub name: String,
}

/// Book metadata embedded in the descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub content_type: String,
    pub title: String,
    pub cover_url: String,
    pub thumbnail_url: String,
    pub creators: Vec<Creator>,
}

impl Metadata {
    /// Parse the inner metadata document
    pub fn parse(xml: &str) -> Result<Self> {
        let root = parse_document(xml)?;

        let creators = root
            .child("Creators")
            .map(|c| {
                c.children_named("Creator")
                    .map(|creator| Creator {
                        role: creator.attr("role").unwrap_or_default().to_string(),
                        name: creator.text().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            content_type: root.text_at(&["ContentType"]),
            title: root.text_at(&["Title"]),
            cover_url: root.text_at(&["CoverUrl"]),
            thumbnail_url: root.text_at(&["ThumbnailUrl"]),
            creators,
        })
    }

    /// First creator with the `author` role, else the first creator
    pub fn author(&self) -> &str {
        self.creators
            .iter()
            .find(|c| c.role.eq_ignore_ascii_case("author"))
            .or_else(|| self.creators.first())
            .map(|c| c.name.as_str())
            .unwrap_or(UNKNOWN_AUTHOR)
    }

    /// Output folder name: sanitized `{author}_{title}`
    pub fn folder_name(&self) -> String {
        sanitize_folder_name(&format!("{}_{}", self.author(), self.title))
    }
}

/// Parsed ODM descriptor
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub id: String,
    pub acquisition_url: String,
    pub early_return_url: String,
    pub transaction_id: String,
    /// `DrmInfo/ExpirationDate`, when present
    pub expiration_date: Option<String>,
    /// Raw inner metadata document
    pub metadata_xml: String,
    pub formats: Vec<Format>,
    /// Original document bytes, copied verbatim next to the parts
    raw: Vec<u8>,
    path: PathBuf,
}

impl Descriptor {
    /// Read and parse a descriptor file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            OdmError::FileIoError(format!("read: {} - {}", path.display(), e))
        })?;
        Self::parse(raw, path)
    }

    /// Parse descriptor bytes that were loaded from `path`
    ///
    /// Fails with `InvalidDescriptor` when the document is not XML or when
    /// the id or the license acquisition URL is empty.
    pub fn parse(raw: Vec<u8>, path: &Path) -> Result<Self> {
        let text = String::from_utf8(raw.clone())
            .map_err(|e| OdmError::invalid_descriptor(format!("not UTF-8: {}", e)))?;
        let root = parse_document(&text).map_err(|e| OdmError::invalid_descriptor(e.to_string()))?;

        let id = root.attr("id").unwrap_or_default().trim().to_string();
        let acquisition_url = root.text_at(&["License", "AcquisitionUrl"]);

        if id.is_empty() {
            return Err(OdmError::invalid_descriptor("missing media id"));
        }
        if acquisition_url.is_empty() {
            return Err(OdmError::invalid_descriptor("missing license acquisition url"));
        }

        let formats = root
            .child("Formats")
            .map(|f| f.children_named("Format").map(parse_format).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        let expiration_date = Some(root.text_at(&["DrmInfo", "ExpirationDate"]))
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            acquisition_url,
            early_return_url: root.text_at(&["EarlyReturnURL"]),
            transaction_id: root.text_at(&["TransactionID"]),
            expiration_date,
            metadata_xml: root.text().to_string(),
            formats,
            raw,
            path: path.to_path_buf(),
        })
    }

    /// Parse the embedded metadata document
    pub fn metadata(&self) -> Result<Metadata> {
        Metadata::parse(&self.metadata_xml)
    }

    /// Path the descriptor was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original document bytes
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// File name of the descriptor, used for the bookkeeping copy
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.odm", self.id))
    }

    /// Sidecar path holding the cached license: `<descriptor>.license`
    pub fn license_path(&self) -> PathBuf {
        let mut sidecar = self.path.clone().into_os_string();
        sidecar.push(".license");
        PathBuf::from(sidecar)
    }
}

fn parse_format(element: &XmlElement) -> Result<Format> {
    let quality = Quality::from_level(
        element
            .find(&["Quality"])
            .and_then(|q| q.attr("level"))
            .unwrap_or_default(),
    );

    let protocols = element
        .child("Protocols")
        .map(|p| {
            p.children_named("Protocol")
                .map(|protocol| Protocol {
                    method: protocol.attr("method").unwrap_or_default().to_string(),
                    base_url: protocol.attr("baseurl").unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let parts = element
        .child("Parts")
        .map(|p| p.children_named("Part").map(parse_part).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    Ok(Format {
        name: element.attr("name").unwrap_or_default().to_string(),
        quality,
        protocols,
        parts,
    })
}

fn parse_part(element: &XmlElement) -> Result<Part> {
    let file_name = element.attr("filename").unwrap_or_default().to_string();
    if file_name.is_empty() {
        return Err(OdmError::invalid_descriptor("part without filename"));
    }

    let local_name = file_name.rsplit('-').next().unwrap_or(&file_name);
    if !is_plain_file_name(local_name) {
        return Err(OdmError::invalid_descriptor(format!(
            "part filename '{}' does not name a local file",
            file_name
        )));
    }

    let size_attr = element.attr("filesize").unwrap_or("0").trim();
    let file_size = size_attr.parse::<u64>().map_err(|_| {
        OdmError::invalid_descriptor(format!("invalid filesize '{}' for {}", size_attr, file_name))
    })?;

    Ok(Part {
        number: element.attr("number").unwrap_or_default().to_string(),
        file_size,
        name: element.attr("name").unwrap_or_default().to_string(),
        file_name,
    })
}
