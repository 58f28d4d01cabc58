use crate::error::CatalogError;
use serde::{Deserialize, Serialize};

/// Width of one partition's id range. An id is `prefix * PREFIX_SPAN + seq`,
/// so the issuing partition of any id is recoverable by integer division.
pub const PREFIX_SPAN: i64 = 10_000_000;

pub const SHARD_COUNT: usize = 7;

/// One of the seven interchangeable active tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shard(u8);

impl Shard {
    pub const ALL: [Shard; SHARD_COUNT] = [
        Shard(1),
        Shard(2),
        Shard(3),
        Shard(4),
        Shard(5),
        Shard(6),
        Shard(7),
    ];

    pub fn new(n: u8) -> Option<Self> {
        (1..=SHARD_COUNT as u8).contains(&n).then_some(Shard(n))
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

/// One physical lot table. Each variant owns a disjoint id prefix; the seven
/// active shards subdivide the active range into 11..17.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    Active(Shard),
    WithoutAuctionDate,
    WithoutImage,
    Historical,
    HistoryAddons,
    OtherVehicle,
    OtherVehicleHistorical,
}

impl Partition {
    pub fn prefix(&self) -> i64 {
        match self {
            Partition::Active(shard) => 10 + shard.0 as i64,
            Partition::Historical => 2,
            Partition::WithoutAuctionDate => 3,
            Partition::WithoutImage => 4,
            Partition::HistoryAddons => 5,
            Partition::OtherVehicle => 6,
            Partition::OtherVehicleHistorical => 7,
        }
    }

    /// Decodes the partition an id was issued for. An unrecognized prefix is
    /// a data-integrity bug and surfaces as a hard error, never a default.
    pub fn of_id(id: i64) -> Result<Self, CatalogError> {
        let partition = match id / PREFIX_SPAN {
            2 => Partition::Historical,
            3 => Partition::WithoutAuctionDate,
            4 => Partition::WithoutImage,
            5 => Partition::HistoryAddons,
            6 => Partition::OtherVehicle,
            7 => Partition::OtherVehicleHistorical,
            n @ 11..=17 => {
                let shard = Shard::new((n - 10) as u8).ok_or(CatalogError::UnknownPartition(id))?;
                Partition::Active(shard)
            }
            _ => return Err(CatalogError::UnknownPartition(id)),
        };
        Ok(partition)
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            Partition::Active(Shard(1)) => "lot_active_1",
            Partition::Active(Shard(2)) => "lot_active_2",
            Partition::Active(Shard(3)) => "lot_active_3",
            Partition::Active(Shard(4)) => "lot_active_4",
            Partition::Active(Shard(5)) => "lot_active_5",
            Partition::Active(Shard(6)) => "lot_active_6",
            Partition::Active(Shard(7)) => "lot_active_7",
            Partition::Active(_) => unreachable!("shard numbers are 1..=7"),
            Partition::WithoutAuctionDate => "lot_without_auction_date",
            Partition::WithoutImage => "lot_without_image",
            Partition::Historical => "lot_historical",
            Partition::HistoryAddons => "history_addon",
            Partition::OtherVehicle => "lot_other_vehicle",
            Partition::OtherVehicleHistorical => "lot_other_vehicle_historical",
        }
    }

    /// Stable name used by the id counter rows and the locator index.
    pub fn name(&self) -> &'static str {
        match self {
            Partition::Active(Shard(1)) => "active_1",
            Partition::Active(Shard(2)) => "active_2",
            Partition::Active(Shard(3)) => "active_3",
            Partition::Active(Shard(4)) => "active_4",
            Partition::Active(Shard(5)) => "active_5",
            Partition::Active(Shard(6)) => "active_6",
            Partition::Active(Shard(7)) => "active_7",
            Partition::Active(_) => unreachable!("shard numbers are 1..=7"),
            Partition::WithoutAuctionDate => "without_auction_date",
            Partition::WithoutImage => "without_image",
            Partition::Historical => "historical",
            Partition::HistoryAddons => "history_addons",
            Partition::OtherVehicle => "other_vehicle",
            Partition::OtherVehicleHistorical => "other_vehicle_historical",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CatalogError> {
        let partition = match name {
            "active_1" => Partition::Active(Shard(1)),
            "active_2" => Partition::Active(Shard(2)),
            "active_3" => Partition::Active(Shard(3)),
            "active_4" => Partition::Active(Shard(4)),
            "active_5" => Partition::Active(Shard(5)),
            "active_6" => Partition::Active(Shard(6)),
            "active_7" => Partition::Active(Shard(7)),
            "without_auction_date" => Partition::WithoutAuctionDate,
            "without_image" => Partition::WithoutImage,
            "historical" => Partition::Historical,
            "history_addons" => Partition::HistoryAddons,
            "other_vehicle" => Partition::OtherVehicle,
            "other_vehicle_historical" => Partition::OtherVehicleHistorical,
            other => return Err(CatalogError::UnknownPartitionName(other.to_string())),
        };
        Ok(partition)
    }

    pub fn is_historical(&self) -> bool {
        matches!(
            self,
            Partition::Historical | Partition::HistoryAddons | Partition::OtherVehicleHistorical
        )
    }

    /// Partitions holding queryable lot rows, as opposed to the denormalized
    /// history addon mirror.
    pub fn holds_lot_rows(&self) -> bool {
        !matches!(self, Partition::HistoryAddons)
    }

    pub fn active_partitions() -> [Partition; SHARD_COUNT] {
        Shard::ALL.map(Partition::Active)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_issued_prefix_decodes_to_its_partition() {
        let all = [
            Partition::WithoutAuctionDate,
            Partition::WithoutImage,
            Partition::Historical,
            Partition::HistoryAddons,
            Partition::OtherVehicle,
            Partition::OtherVehicleHistorical,
        ]
        .into_iter()
        .chain(Shard::ALL.into_iter().map(Partition::Active));

        for partition in all {
            let first = partition.prefix() * PREFIX_SPAN + 1;
            let last = partition.prefix() * PREFIX_SPAN + PREFIX_SPAN - 1;
            assert_eq!(Partition::of_id(first).unwrap(), partition);
            assert_eq!(Partition::of_id(last).unwrap(), partition);
        }
    }

    #[test]
    fn unknown_prefix_is_a_hard_error() {
        for id in [0, 1, 9_999_999, 90_000_000, 180_000_000, -23] {
            assert!(matches!(
                Partition::of_id(id),
                Err(CatalogError::UnknownPartition(_))
            ));
        }
    }

    #[test]
    fn shard_constructor_bounds() {
        assert!(Shard::new(0).is_none());
        assert!(Shard::new(8).is_none());
        assert_eq!(Shard::new(3).unwrap().number(), 3);
    }

    #[test]
    fn display_matches_the_stable_name() {
        assert_eq!(Partition::Historical.to_string(), "historical");
        assert_eq!(
            Partition::Active(Shard::new(3).unwrap()).to_string(),
            "active_3"
        );
        assert_eq!(
            format!("{}", Partition::OtherVehicleHistorical),
            "other_vehicle_historical"
        );
    }

    #[test]
    fn partition_names_roundtrip() {
        for shard in Shard::ALL {
            let p = Partition::Active(shard);
            assert_eq!(Partition::from_name(p.name()).unwrap(), p);
        }
        assert_eq!(
            Partition::from_name("historical").unwrap(),
            Partition::Historical
        );
        assert!(Partition::from_name("lot_active_1").is_err());
    }
}
