//! Named replication channels.

use strum::IntoEnumIterator;

/// One pub/sub channel per event kind.
///
/// The split exists so operators can watch a single kind of traffic;
/// consumers merge all five into one stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    /// Full-state resync after a reconnect.
    Sync,
    /// Player joins.
    Join,
    /// Player departures.
    Leave,
    /// Accepted moves.
    Move,
    /// Game resets.
    Reset,
}

impl Channel {
    /// Wire name under `prefix`, e.g. `tic_tac_toe:move`.
    pub fn name(self, prefix: &str) -> String {
        format!("{}:{}", prefix, self)
    }

    /// Parses a wire name produced by [`Channel::name`].
    pub fn from_name(prefix: &str, name: &str) -> Option<Self> {
        let kind = name.strip_prefix(prefix)?.strip_prefix(':')?;
        Channel::iter().find(|c| c.as_ref() == kind)
    }

    /// Wire names of every channel under `prefix`.
    pub fn all_names(prefix: &str) -> Vec<String> {
        Channel::iter().map(|c| c.name(prefix)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for channel in Channel::iter() {
            let name = channel.name("tic_tac_toe");
            assert_eq!(Channel::from_name("tic_tac_toe", &name), Some(channel));
        }
        assert_eq!(Channel::Move.name("tic_tac_toe"), "tic_tac_toe:move");
    }

    #[test]
    fn test_foreign_prefix_rejected() {
        assert_eq!(Channel::from_name("tic_tac_toe", "chess:move"), None);
        assert_eq!(Channel::from_name("tic_tac_toe", "tic_tac_toe:castle"), None);
    }
}
