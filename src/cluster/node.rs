//! Cluster node representation and membership parsing

use crate::utils::{ClusterError, RespValue};

/// Length of the node ID prefix embedded in job IDs
pub const NODE_PREFIX_LEN: usize = 8;

/// Priority assigned when the membership format carries none
pub const DEFAULT_PRIORITY: i64 = 1;

/// Cluster node information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Node ID as reported by the cluster
    pub id: String,
    /// First 8 characters of `id`
    pub id_prefix: String,
    /// Hostname or IP
    pub host: String,
    /// Port
    pub port: u16,
    /// Node priority (1 is healthy; higher means less preferred)
    pub priority: i64,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16, priority: i64) -> Self {
        let id = id.into();
        let id_prefix = node_id_prefix(&id).to_string();
        Self {
            id,
            id_prefix,
            host: host.into(),
            port,
            priority,
        }
    }

    /// Get node address as string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// First `NODE_PREFIX_LEN` characters of a node ID (the whole ID if shorter)
pub fn node_id_prefix(id: &str) -> &str {
    match id.char_indices().nth(NODE_PREFIX_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Parse a membership reply into node records, in reply order.
///
/// Two formats are accepted:
/// - `HELLO`: `[version, my-id, [id, host, port, priority], ...]`
/// - `CLUSTER NODES`: text block, one `<id> <host:port> ...` line per node
pub fn parse_membership(reply: &RespValue) -> Result<Vec<NodeRecord>, ClusterError> {
    let nodes: Vec<NodeRecord> = match reply {
        RespValue::Array(items) => {
            if items.len() < 2 {
                return Err(ClusterError::ParseFailed(format!(
                    "HELLO reply has {} elements, expected at least 2",
                    items.len()
                )));
            }
            items[2..].iter().filter_map(parse_hello_entry).collect()
        }
        RespValue::BulkString(_) | RespValue::SimpleString(_) => {
            let text = reply.as_str().ok_or_else(|| {
                ClusterError::ParseFailed("membership text is not valid UTF-8".to_string())
            })?;
            text.lines().filter_map(parse_cluster_node_line).collect()
        }
        other => {
            return Err(ClusterError::ParseFailed(format!(
                "unexpected {} reply to membership query",
                other.kind()
            )))
        }
    };

    if nodes.is_empty() {
        return Err(ClusterError::ParseFailed(
            "membership reply lists no nodes".to_string(),
        ));
    }
    Ok(nodes)
}

/// Parse one `[id, host, port, priority]` entry of a HELLO reply
fn parse_hello_entry(entry: &RespValue) -> Option<NodeRecord> {
    let fields = entry.as_array()?;
    if fields.len() < 3 {
        return None;
    }

    let id = fields[0].as_str()?;
    let host = fields[1].as_str()?;
    let port = u16::try_from(fields[2].as_i64()?).ok()?;
    let priority = fields
        .get(3)
        .and_then(RespValue::as_i64)
        .unwrap_or(DEFAULT_PRIORITY);

    if id.is_empty() || host.is_empty() {
        return None;
    }

    Some(NodeRecord::new(id, host, port, priority))
}

/// Parse a line from CLUSTER NODES response
///
/// Format: `<id> <ip:port[@cport]> <flags> ...`; only the first two fields are used.
///
/// Example:
/// ```text
/// 07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:7711 myself - 0 0 connected
/// ```
pub fn parse_cluster_node_line(line: &str) -> Option<NodeRecord> {
    let mut parts = line.split_whitespace();
    let id = parts.next()?;
    let (host, port) = parse_node_address(parts.next()?)?;
    Some(NodeRecord::new(id, host, port, DEFAULT_PRIORITY))
}

/// Parse node address from CLUSTER NODES
/// Formats: "host:port@cport", "host:port", "host:port@cport,hostname"
fn parse_node_address(addr: &str) -> Option<(String, u16)> {
    let addr = addr.split(',').next().unwrap_or(addr);
    let host_port = addr.split('@').next().unwrap_or(addr);

    let (host, port) = host_port.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok()?;

    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RespValue {
        RespValue::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_node_id_prefix() {
        assert_eq!(
            node_id_prefix("dcb833cf0a5b4b1f07e9f7f1c3d7f8ae7cd4b71a"),
            "dcb833cf"
        );
        assert_eq!(node_id_prefix("abc"), "abc");
        assert_eq!(node_id_prefix(""), "");
    }

    #[test]
    fn test_parse_hello_reply() {
        let reply = RespValue::Array(vec![
            RespValue::Integer(1),
            bulk("1111111100000000"),
            RespValue::Array(vec![
                bulk("1111111100000000"),
                bulk("10.0.0.1"),
                bulk("7711"),
                bulk("1"),
            ]),
            RespValue::Array(vec![
                bulk("2222222200000000"),
                bulk("10.0.0.2"),
                RespValue::Integer(7712),
                bulk("10"),
            ]),
        ]);

        let nodes = parse_membership(&reply).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], NodeRecord::new("1111111100000000", "10.0.0.1", 7711, 1));
        assert_eq!(nodes[1].id_prefix, "22222222");
        assert_eq!(nodes[1].port, 7712);
        assert_eq!(nodes[1].priority, 10);
        assert_eq!(nodes[1].address(), "10.0.0.2:7712");
    }

    #[test]
    fn test_parse_hello_skips_malformed_entries() {
        let reply = RespValue::Array(vec![
            RespValue::Integer(1),
            bulk("aaaaaaaa"),
            RespValue::Array(vec![bulk("aaaaaaaa"), bulk("h"), bulk("not-a-port")]),
            RespValue::Array(vec![bulk("bbbbbbbb"), bulk("h"), bulk("7711")]),
            bulk("garbage"),
        ]);
        let nodes = parse_membership(&reply).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "bbbbbbbb");
        assert_eq!(nodes[0].priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_parse_cluster_nodes_text() {
        let text = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:7711 myself - 0 0 connected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:7712@17712 - 0 0 connected

";
        let nodes = parse_membership(&bulk(text)).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id_prefix, "07c37dfe");
        assert_eq!(nodes[0].address(), "127.0.0.1:7711");
        assert_eq!(nodes[1].port, 7712);
    }

    #[test]
    fn test_parse_cluster_node_line_minimal() {
        let node = parse_cluster_node_line("abcdef0123456789 host:7711").unwrap();
        assert_eq!(node.host, "host");
        assert_eq!(node.id_prefix, "abcdef01");
        assert!(parse_cluster_node_line("abcdef0123456789").is_none());
        assert!(parse_cluster_node_line("abcdef0123456789 :0").is_none());
    }

    #[test]
    fn test_parse_node_address() {
        assert_eq!(
            parse_node_address("127.0.0.1:7711@17711"),
            Some(("127.0.0.1".to_string(), 7711))
        );
        assert_eq!(
            parse_node_address("10.0.0.1:7711@17711,hostname.example.com"),
            Some(("10.0.0.1".to_string(), 7711))
        );
        assert_eq!(parse_node_address("noport"), None);
    }

    #[test]
    fn test_parse_membership_rejects_bad_shapes() {
        assert!(parse_membership(&RespValue::Integer(3)).is_err());
        assert!(parse_membership(&RespValue::Array(vec![RespValue::Integer(1)])).is_err());
        // Valid shape but no nodes
        assert!(parse_membership(&RespValue::Array(vec![
            RespValue::Integer(1),
            bulk("x")
        ]))
        .is_err());
        assert!(parse_membership(&bulk("\n\n")).is_err());
    }
}
