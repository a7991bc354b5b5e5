use anyhow::{Result, anyhow};
use crossbeam_channel::bounded;
use osmpbf::{Blob, BlobDecode, BlobReader, Element, HeaderBlock, RelMemberType};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{EntityFeed, StreamSourceFailure, TierMask};
use crate::model::{Chain, Entity, Group, Member, Point, TagMap, Tier};
use crate::utils::ProgressCounter;

// Blobs decoded in parallel per window; windows are forwarded in file order
const DECODE_WINDOW: usize = 32;

/// Feed over an OSM PBF file. Each replay reopens the file; blobs are
/// decoded on the rayon pool and handed to the calling thread in order.
pub struct PbfFeed {
    path: PathBuf,
    header_logged: Arc<AtomicBool>,
}

impl PbfFeed {
    /// Open the file once up front so a bad path fails before any pass.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        BlobReader::from_path(&path).map_err(|err| source_failure(&path, err))?;
        Ok(Self {
            path,
            header_logged: Arc::new(AtomicBool::new(false)),
        })
    }
}

fn source_failure(path: &Path, err: impl std::fmt::Display) -> anyhow::Error {
    StreamSourceFailure {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
    .into()
}

pub fn log_sorted_header(header: &HeaderBlock, logged: &AtomicBool) {
    let found: Vec<String> = header
        .required_features()
        .iter()
        .chain(header.optional_features())
        .map(|feature| feature.trim())
        .filter(|feature| {
            ["Sort.Type_then_ID", "Sort.Nodes", "Sort.Ways", "Sort.Relations"]
                .iter()
                .any(|known| known.eq_ignore_ascii_case(feature))
        })
        .map(str::to_string)
        .collect();

    if found.is_empty() {
        return;
    }
    if !logged.swap(true, Ordering::SeqCst) {
        tracing::info!("Detected PBF sort header(s): {}", found.join(", "));
    }
}

fn tag_map<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> TagMap {
    let mut map = TagMap::new();
    for (key, value) in tags {
        map.insert(key, value);
    }
    map
}

/// Decode one blob into the entities of the requested tiers.
fn decode_blob(blob: Blob, tiers: TierMask, logged: &AtomicBool) -> Result<Vec<Entity>> {
    let block = match blob.decode()? {
        BlobDecode::OsmHeader(header) => {
            log_sorted_header(&header, logged);
            return Ok(Vec::new());
        }
        BlobDecode::OsmData(block) => block,
        BlobDecode::Unknown(unknown) => {
            tracing::info!("Unknown blob: {}", unknown);
            return Ok(Vec::new());
        }
    };

    let mut entities = Vec::new();
    for element in block.elements() {
        match element {
            Element::Node(node) if tiers.points => entities.push(Entity::Point(Point {
                id: node.id(),
                tags: tag_map(node.tags()),
                lon: node.lon(),
                lat: node.lat(),
            })),
            Element::DenseNode(node) if tiers.points => entities.push(Entity::Point(Point {
                id: node.id(),
                tags: tag_map(node.tags()),
                lon: node.lon(),
                lat: node.lat(),
            })),
            Element::Way(way) if tiers.chains => entities.push(Entity::Chain(Chain {
                id: way.id(),
                tags: tag_map(way.tags()),
                refs: way.refs().collect(),
            })),
            Element::Relation(relation) if tiers.groups => {
                let mut members = Vec::new();
                for member in relation.members() {
                    let tier = match member.member_type {
                        RelMemberType::Node => Tier::Point,
                        RelMemberType::Way => Tier::Chain,
                        RelMemberType::Relation => Tier::Group,
                    };
                    members.push(Member {
                        id: member.member_id,
                        tier,
                        role: member.role()?.to_string(),
                    });
                }
                entities.push(Entity::Group(Group {
                    id: relation.id(),
                    tags: tag_map(relation.tags()),
                    members,
                }));
            }
            _ => {}
        }
    }
    Ok(entities)
}

impl EntityFeed for PbfFeed {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn size_bytes(&self) -> Option<u64> {
        std::fs::metadata(&self.path).map(|m| m.len()).ok()
    }

    fn replay(
        &mut self,
        tiers: TierMask,
        visit: &mut dyn FnMut(Entity) -> Result<()>,
    ) -> Result<u64> {
        let reader =
            BlobReader::from_path(&self.path).map_err(|err| source_failure(&self.path, err))?;
        let (tx, rx) = bounded::<Vec<Entity>>(4);
        let path = self.path.clone();
        let header_logged = Arc::clone(&self.header_logged);

        let decoder = std::thread::spawn(move || -> Result<()> {
            let progress = ProgressCounter::new("Decoding blocks", 100);
            let mut blobs = reader.peekable();
            while blobs.peek().is_some() {
                let window = blobs
                    .by_ref()
                    .take(DECODE_WINDOW)
                    .collect::<std::result::Result<Vec<Blob>, _>>()
                    .map_err(|err| source_failure(&path, err))?;
                let window_len = window.len() as u64;

                let batches = window
                    .into_par_iter()
                    .map(|blob| decode_blob(blob, tiers, &header_logged))
                    .collect::<Result<Vec<_>>>()
                    .map_err(|err| source_failure(&path, err))?;
                progress.inc(window_len);

                for batch in batches.into_iter().filter(|b| !b.is_empty()) {
                    tx.send(batch)
                        .map_err(|err| anyhow!("Feed: Failed to send entity batch: {}", err))?;
                }
            }
            progress.finish();
            Ok(())
        });

        let mut visited = 0u64;
        let mut visit_result = Ok(());
        for batch in rx.iter() {
            for entity in batch {
                if let Err(err) = visit(entity) {
                    visit_result = Err(err);
                    break;
                }
                visited += 1;
            }
            if visit_result.is_err() {
                break;
            }
        }
        // Unblocks a decoder waiting on a full channel
        drop(rx);

        let decoder_join = decoder.join();

        // A failing visitor is the root cause when the decoder saw a closed channel
        visit_result?;

        match decoder_join {
            Ok(Ok(())) => Ok(visited),
            Ok(Err(decoder_err)) => Err(decoder_err),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(anyhow!("Feed: Decoder thread panicked: {}", panic_msg))
            }
        }
    }
}
