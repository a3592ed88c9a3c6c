//! Shared fixtures for unit tests.

crate::entity! {
    /// Test entity.
    pub(crate) struct Item;
}

crate::properties! {
    pub(crate) struct ItemProps {
        pub label: String,
    }
}

crate::shard! {
    pub(crate) struct ShopShard : "shop" {
        collections {
            items: Item => ItemProps,
        }
        relations {
            links: Item => Item = OneToMany,
        }
    }
}

crate::shard! {
    pub(crate) struct DepotShard : "depot" {
        collections {
            crates: Item => ItemProps,
        }
        relations {}
    }
}
