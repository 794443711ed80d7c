//! Parser for `hdfs fsck <path> -files -blocks -locations` output.
//!
//! Block lines start with the block index:
//!
//! ```text
//! 0. BP-929597290-192.0.0.2-1439573305237:blk_1073742025_1201 len=134217728 Live_repl=3 [DatanodeInfoWithStorage[192.168.1.5:50010,DS-6d6ab1d3,DISK], DatanodeInfoWithStorage[192.168.1.6:50010,DS-1b2c,DISK]]
//! ```
//!
//! Of the rest only two lines matter. The file header declares the block
//! count (`/data/f 268435456 bytes, 2 block(s):  OK`) and the `Status:` line
//! marks the end of the listing. Output missing either, or listing a
//! different number of blocks than declared, was cut short and is rejected.

use super::directory::NodeDirectory;
use super::traits::{BlockLocation, LocateError, ReplicaLocation};
use crate::ledger::BlockId;
use std::path::{Path, PathBuf};

const DATANODE_MARKER: &str = "DatanodeInfoWithStorage[";

/// A block line, before node addresses are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsckBlock {
    pub pool_id: String,
    pub block_id: BlockId,
    /// Datanode addresses, port stripped.
    pub addresses: Vec<String>,
}

/// Parse one block line. Returns `None` for anything that is not one.
pub fn parse_block_line(line: &str) -> Option<FsckBlock> {
    let line = line.trim_start();
    if !line.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let (head, tail) = line.split_once('[').unwrap_or((line, ""));
    let token = head.split_whitespace().nth(1)?;
    let (pool_id, block) = token.split_once(':')?;
    // blk_<id>_<generation stamp>
    let id = block.strip_prefix("blk_")?.split('_').next()?;
    let block_id = BlockId::new(id.parse().ok()?);

    let mut addresses = Vec::new();
    let mut rest = tail;
    while let Some(start) = rest.find(DATANODE_MARKER) {
        rest = &rest[start + DATANODE_MARKER.len()..];
        let end = rest.find(']').unwrap_or(rest.len());
        let storage = &rest[..end];
        let host_port = storage.split(',').next().unwrap_or_default();
        let host = host_port
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or(host_port);
        if !host.is_empty() {
            addresses.push(host.to_string());
        }
        rest = &rest[end..];
    }

    Some(FsckBlock {
        pool_id: pool_id.to_string(),
        block_id,
        addresses,
    })
}

/// Block count declared by a file header line.
pub fn declared_blocks(line: &str) -> Option<usize> {
    let (head, _) = line.split_once(" block(s)")?;
    head.rsplit(|c: char| c.is_whitespace() || c == ',')
        .next()?
        .parse()
        .ok()
}

/// Local path of a finalized replica inside a storage node data directory.
///
/// Storage nodes spread finalized blocks over a two-level `subdirN` tree
/// derived from the block id.
pub fn replica_path(data_dir: &Path, pool_id: &str, block_id: BlockId) -> PathBuf {
    let id = block_id.value();
    let d1 = (id >> 16) & 0x1F;
    let d2 = (id >> 8) & 0x1F;
    data_dir
        .join("current")
        .join(pool_id)
        .join("current")
        .join("finalized")
        .join(format!("subdir{}", d1))
        .join(format!("subdir{}", d2))
        .join(block_id.to_string())
}

/// Parse full fsck output into block locations, resolving each address
/// through `directory`.
pub fn parse_fsck(
    file_path: &str,
    output: &str,
    directory: &NodeDirectory,
) -> Result<Vec<BlockLocation>, LocateError> {
    if output.contains("does not exist") {
        return Err(LocateError::FileNotFound(file_path.to_string()));
    }

    let mut blocks = Vec::new();
    let mut declared: Option<usize> = None;
    let mut complete = false;
    for line in output.lines() {
        if line.trim_start().starts_with("Status:") {
            complete = true;
        }
        if let Some(n) = declared_blocks(line) {
            *declared.get_or_insert(0) += n;
        }
        let Some(block) = parse_block_line(line) else {
            continue;
        };

        let mut replicas = Vec::with_capacity(block.addresses.len());
        for address in &block.addresses {
            let node = directory.by_address(address).ok_or_else(|| {
                LocateError::LocatorUnavailable(format!(
                    "datanode {} is not in the node directory",
                    address
                ))
            })?;
            replicas.push(ReplicaLocation {
                node: node.identity.clone(),
                local_path: replica_path(&node.data_dir, &block.pool_id, block.block_id),
            });
        }
        blocks.push(BlockLocation {
            block_id: block.block_id,
            replicas,
        });
    }

    match declared {
        Some(n) if complete && n == blocks.len() => Ok(blocks),
        Some(n) if complete => Err(LocateError::LocatorUnavailable(format!(
            "fsck for {} declared {} block(s) but listed {}",
            file_path,
            n,
            blocks.len()
        ))),
        _ => Err(LocateError::LocatorUnavailable(format!(
            "incomplete fsck output for {}",
            file_path
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdfs::directory::NodeEntry;
    use crate::ledger::NodeIdentity;
    use proptest::prelude::*;

    const SAMPLE: &str = "\
Connecting to namenode via http://nn:50070/fsck?ugi=hdfs&files=1&blocks=1&locations=1&path=%2Fdata%2Fsecret.csv
FSCK started by hdfs (auth:SIMPLE) from /10.0.0.10 for path /data/secret.csv at Mon Aug 17 10:00:00 UTC 2015
/data/secret.csv 268435456 bytes, 2 block(s):  OK
0. BP-929597290-192.0.0.2-1439573305237:blk_1073742025_1201 len=134217728 Live_repl=2 [DatanodeInfoWithStorage[10.0.0.1:50010,DS-6d6ab1d3,DISK], DatanodeInfoWithStorage[10.0.0.2:50010,DS-1b2c,DISK]]
1. BP-929597290-192.0.0.2-1439573305237:blk_1073742026_1202 len=134217728 Live_repl=1 [DatanodeInfoWithStorage[10.0.0.2:50010,DS-1b2c,DISK]]

Status: HEALTHY
 Total size:\t268435456 B
The filesystem under path '/data/secret.csv' is HEALTHY
";

    fn directory() -> NodeDirectory {
        NodeDirectory::new([
            NodeEntry {
                address: "10.0.0.1".into(),
                identity: NodeIdentity::new("dn-01").unwrap(),
                data_dir: "/hadoop/dfs/data".into(),
            },
            NodeEntry {
                address: "10.0.0.2".into(),
                identity: NodeIdentity::new("dn-02").unwrap(),
                data_dir: "/grid/0/dfs".into(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_block_line() {
        let line = SAMPLE.lines().nth(3).unwrap();
        let block = parse_block_line(line).unwrap();
        assert_eq!(block.pool_id, "BP-929597290-192.0.0.2-1439573305237");
        assert_eq!(block.block_id, BlockId::new(1073742025));
        assert_eq!(block.addresses, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_non_block_lines_ignored() {
        assert!(parse_block_line("Status: HEALTHY").is_none());
        assert!(parse_block_line("/data/secret.csv 1 bytes, 1 block(s):  OK").is_none());
        assert!(parse_block_line("").is_none());
        assert!(parse_block_line(" Total blocks (validated):\t2").is_none());
    }

    #[test]
    fn test_negative_legacy_block_id() {
        let block =
            parse_block_line("0. BP-1-127.0.0.1-1:blk_-4312_1001 len=10 Live_repl=0 []").unwrap();
        assert_eq!(block.block_id, BlockId::new(-4312));
        assert!(block.addresses.is_empty());
    }

    #[test]
    fn test_replica_path_layout() {
        // 1073742025 = 0x400001C9
        let path = replica_path(
            Path::new("/hadoop/dfs/data"),
            "BP-1",
            BlockId::new(1073742025),
        );
        assert_eq!(
            path,
            PathBuf::from(
                "/hadoop/dfs/data/current/BP-1/current/finalized/subdir0/subdir1/blk_1073742025"
            )
        );

        let path = replica_path(Path::new("/d"), "BP-1", BlockId::new(0x0003_0500));
        assert!(path.ends_with("finalized/subdir3/subdir5/blk_197888"));
    }

    #[test]
    fn test_parse_full_output() {
        let blocks = parse_fsck("/data/secret.csv", SAMPLE, &directory()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].replicas.len(), 2);
        assert_eq!(blocks[0].replicas[0].node.as_str(), "dn-01");
        assert!(blocks[0].replicas[1]
            .local_path
            .starts_with("/grid/0/dfs/current/BP-929597290-192.0.0.2-1439573305237"));
        assert_eq!(blocks[1].block_id, BlockId::new(1073742026));
        assert_eq!(blocks[1].replicas[0].node.as_str(), "dn-02");
    }

    #[test]
    fn test_missing_file() {
        let out = "Connecting to namenode\nFSCK started\nPath '/data/none' does not exist\n";
        assert_eq!(
            parse_fsck("/data/none", out, &directory()),
            Err(LocateError::FileNotFound("/data/none".into()))
        );
    }

    #[test]
    fn test_unknown_datanode() {
        let out = "0. BP-1:blk_5_1 len=1 Live_repl=1 [DatanodeInfoWithStorage[10.9.9.9:50010,DS-1,DISK]]\nStatus: HEALTHY\n";
        let err = parse_fsck("/f", out, &directory()).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("10.9.9.9"));
    }

    #[test]
    fn test_empty_file_and_garbage() {
        let empty = "/data/empty 0 bytes, 0 block(s):  OK\nStatus: HEALTHY\n";
        assert!(parse_fsck("/data/empty", empty, &directory()).unwrap().is_empty());

        let garbage = "Exception in thread \"main\" java.net.ConnectException: Connection refused\n";
        assert!(matches!(
            parse_fsck("/data/x", garbage, &directory()),
            Err(LocateError::LocatorUnavailable(_))
        ));
    }

    #[test]
    fn test_declared_blocks() {
        assert_eq!(declared_blocks("/data/secret.csv 268435456 bytes, 2 block(s):  OK"), Some(2));
        assert_eq!(
            declared_blocks("/data/a.csv 5 bytes, replicated: replication=2, 1 block(s):  OK"),
            Some(1)
        );
        assert_eq!(declared_blocks("Status: HEALTHY"), None);
    }

    #[test]
    fn test_truncated_output_rejected() {
        // Connection dropped after the first block line
        let cut: String = SAMPLE.lines().take(4).map(|l| format!("{}\n", l)).collect();
        assert!(matches!(
            parse_fsck("/data/secret.csv", &cut, &directory()),
            Err(LocateError::LocatorUnavailable(_))
        ));

        // Status present but a block line lost
        let out = "/data/f 3 bytes, 3 block(s):  OK\n\
                   0. BP-1:blk_5_1 len=1 Live_repl=1 [DatanodeInfoWithStorage[10.0.0.1:50010,DS-1,DISK]]\n\
                   Status: HEALTHY\n";
        let err = parse_fsck("/data/f", out, &directory()).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("declared 3"));

        // No header at all
        let out = "0. BP-1:blk_5_1 len=1 Live_repl=1 [DatanodeInfoWithStorage[10.0.0.1:50010,DS-1,DISK]]\nStatus: HEALTHY\n";
        assert!(parse_fsck("/data/f", out, &directory()).is_err());
    }

    proptest! {
        /// Property: Any block line the parser accepts carries the block id it was built from
        #[test]
        fn block_line_roundtrip(
            id in any::<i64>(),
            gen in 0u64..1_000_000,
            hosts in prop::collection::vec("10\\.[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}", 0..4),
        ) {
            let storages: Vec<String> = hosts
                .iter()
                .map(|h| format!("DatanodeInfoWithStorage[{}:50010,DS-x,DISK]", h))
                .collect();
            let line = format!(
                "3. BP-7-10.0.0.1-99:blk_{}_{} len=1 Live_repl={} [{}]",
                id, gen, hosts.len(), storages.join(", ")
            );
            let block = parse_block_line(&line).unwrap();
            prop_assert_eq!(block.block_id, BlockId::new(id));
            prop_assert_eq!(block.addresses, hosts);
        }

        /// Property: The parser never panics on arbitrary input
        #[test]
        fn parser_total(line in ".{0,200}") {
            let _ = parse_block_line(&line);
        }
    }
}
