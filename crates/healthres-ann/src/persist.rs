use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use healthres_core::types::{Metric, Provenance};
use healthres_core::{Error, Result};

use crate::index::{index_err, AnnConfig, AnnIndex};

const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    version: u32,
    dim: usize,
    metric: Metric,
    connectivity: usize,
    expansion_add: usize,
    provenance: Provenance,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    header: Header,
    graph: Vec<u8>,
}

impl AnnIndex {
    /// Writes the graph along with the corpus and embedding model it was built from.
    pub fn save(&self, path: &Path, provenance: &Provenance) -> Result<()> {
        let mut graph = vec![0u8; self.index.serialized_length()];
        self.index.save_to_buffer(&mut graph).map_err(index_err("failed to serialise local index"))?;
        let file = IndexFile {
            header: Header {
                version: FORMAT_VERSION,
                dim: self.dim,
                metric: self.config.metric,
                connectivity: self.config.connectivity,
                expansion_add: self.config.expansion_add,
                provenance: provenance.clone(),
            },
            graph,
        };
        let bytes = bincode::serde::encode_to_vec(&file, bincode::config::standard())
            .map_err(|e| Error::DataLoad(format!("failed to encode local index: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::DataLoad(format!("{}: {e}", parent.display())))?;
        }
        let tmp = path.with_extension("ann.tmp");
        fs::write(&tmp, &bytes).map_err(|e| Error::DataLoad(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, path).map_err(|e| Error::DataLoad(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), bytes = bytes.len(), %provenance, "saved local index");
        Ok(())
    }

    /// Reads an index saved by [`AnnIndex::save`].
    ///
    /// Fails with `IndexConfigMismatch` when the file was written by another
    /// format version or describes a different dimension, metric, graph shape,
    /// corpus or embedding model.
    pub fn load(path: &Path, config: &AnnConfig, dim: usize, provenance: &Provenance) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::DataLoad(format!("{}: {e}", path.display())))?;
        let (file, _): (IndexFile, usize) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| Error::DataLoad(format!("{}: unreadable index file: {e}", path.display())))?;
        let header = &file.header;

        let index = path.display().to_string();
        if header.version != FORMAT_VERSION {
            return Err(Error::index_mismatch(index, format!("format version {} is not {FORMAT_VERSION}", header.version)));
        }
        if header.dim != dim {
            return Err(Error::index_mismatch(index, format!("dimension {} but embeddings have {dim}", header.dim)));
        }
        if header.metric != config.metric
            || header.connectivity != config.connectivity
            || header.expansion_add != config.expansion_add
        {
            return Err(Error::index_mismatch(
                index,
                format!(
                    "built as {} m={} ef={}, configured {} m={} ef={}",
                    header.metric,
                    header.connectivity,
                    header.expansion_add,
                    config.metric,
                    config.connectivity,
                    config.expansion_add
                ),
            ));
        }
        if header.provenance.model_id != provenance.model_id {
            return Err(Error::index_mismatch(
                index,
                format!("embedded with '{}', session uses '{}'", header.provenance.model_id, provenance.model_id),
            ));
        }
        if header.provenance.fingerprint != provenance.fingerprint {
            return Err(Error::index_mismatch(index, "built from a different corpus"));
        }

        let loaded = AnnIndex::empty(dim, config)?;
        loaded.index.load_from_buffer(&file.graph).map_err(|e| {
            Error::DataLoad(format!("{}: corrupt index graph: {e}", path.display()))
        })?;
        loaded.index.change_expansion_search(config.expansion_search);
        info!(path = %path.display(), items = loaded.len(), "loaded local index");
        Ok(loaded)
    }
}
