//! The ECS granule metadata document shipped next to each H5 file (`*.h5.xml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::grid::TileId;

const HORIZONTAL_TILE_ATTRIBUTE: &str = "HORIZONTALTILENUMBER";
const VERTICAL_TILE_ATTRIBUTE: &str = "VERTICALTILENUMBER";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sidecar {
    /// Product-specific attributes (`PSAName` / `PSAValue` pairs).
    attributes: BTreeMap<String, String>,
    /// First text value of every other leaf element, keyed by element name.
    fields: BTreeMap<String, String>,
}

impl Sidecar {
    /// `<container>.xml`, e.g. `scene.h5` -> `scene.h5.xml`.
    pub fn path_for(container: &Path) -> PathBuf {
        let mut name = container.as_os_str().to_owned();
        name.push(".xml");
        PathBuf::from(name)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let xml = fs::read_to_string(path)?;
        Self::parse(&xml).map_err(|e| match e {
            Error::Metadata(msg) => Error::Metadata(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Reads the sidecar of `container` if there is one.
    pub fn find(container: &Path) -> Result<Option<Self>> {
        let path = Self::path_for(container);
        if !path.exists() {
            return Ok(None);
        }
        Self::open(&path).map(Some)
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut sidecar = Sidecar::default();
        let mut open: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut psa_name: Option<String> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    open.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    text.clear();
                }
                Event::Text(e) => text.push_str(&e.unescape()?),
                Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
                Event::End(_) => {
                    let Some(element) = open.pop() else {
                        return Err(Error::Metadata("unbalanced end tag".to_string()));
                    };
                    let value = text.trim().to_string();
                    text.clear();
                    match element.as_str() {
                        "PSAName" => psa_name = Some(value),
                        "PSAValue" => {
                            if let Some(name) = psa_name.take() {
                                sidecar.attributes.insert(name, value);
                            }
                        }
                        _ if !value.is_empty() => {
                            sidecar.fields.entry(element).or_insert(value);
                        }
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !open.is_empty() {
            return Err(Error::Metadata(format!(
                "document ends inside <{}>",
                open.join("><")
            )));
        }
        tracing::debug!(
            "Parsed sidecar with {} attributes and {} fields",
            sidecar.attributes.len(),
            sidecar.fields.len()
        );
        Ok(sidecar)
    }

    /// Product-specific attribute, matched case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn field(&self, element: &str) -> Option<&str> {
        self.fields.get(element).map(String::as_str)
    }

    pub fn tile(&self) -> Result<Option<TileId>> {
        match (
            self.attribute(HORIZONTAL_TILE_ATTRIBUTE),
            self.attribute(VERTICAL_TILE_ATTRIBUTE),
        ) {
            (Some(h), Some(v)) => TileId::parse(h, v).map(Some),
            _ => Ok(None),
        }
    }
}
