// ABOUTME: Table descriptors for the lightningd wallet schema (database version 162)
// ABOUTME: Field order mirrors the SQLite column order of each table

use super::descriptor::{blob, int, opt_int, opt_text, text, RowRule, TableDescriptor};

/// Wallet schema version these descriptors were written against.
pub const SCHEMA_VERSION: i64 = 162;

pub const VARS: TableDescriptor = TableDescriptor::new(
    "vars",
    &[text("name"), opt_text("val"), opt_int("intval"), blob("blobval")],
)
.conflict_key(&["name"])
.upsert()
// older versions stored a blob in `val`, postgres only takes text there
.rules(&[RowRule::ClearWhen {
    column: "val",
    when_column: "name",
    equals: "genesis_hash",
}]);

pub const BLOCKS: TableDescriptor = TableDescriptor::new(
    "blocks",
    &[opt_int("height"), blob("hash"), blob("prev_hash")],
)
.conflict_key(&["height"]);

pub const CHANNEL_CONFIGS: TableDescriptor = TableDescriptor::new(
    "channel_configs",
    &[
        opt_int("id"),
        opt_int("dust_limit_satoshis"),
        opt_int("max_htlc_value_in_flight_msat"),
        opt_int("channel_reserve_satoshis"),
        opt_int("htlc_minimum_msat"),
        opt_int("to_self_delay"),
        opt_int("max_accepted_htlcs"),
    ],
)
.conflict_key(&["id"])
.serial("id");

pub const PEERS: TableDescriptor =
    TableDescriptor::new("peers", &[int("id"), blob("node_id"), text("address")])
        .conflict_key(&["id"])
        .serial("id");

pub const CHANNELS: TableDescriptor = TableDescriptor::new(
    "channels",
    &[
        int("id"),
        opt_int("peer_id"),
        opt_text("short_channel_id"),
        int("channel_config_local"),
        int("channel_config_remote"),
        int("state"),
        int("funder"),
        int("channel_flags"),
        int("minimum_depth"),
        int("next_index_local"),
        int("next_index_remote"),
        int("next_htlc_id"),
        blob("funding_tx_id"),
        int("funding_tx_outnum"),
        int("funding_satoshi"),
        int("funding_tx_remote_sigs_received"),
        int("our_funding_satoshi"),
        int("funding_locked_remote"),
        int("push_msatoshi"),
        int("msatoshi_local"),
        blob("fundingkey_remote"),
        blob("revocation_basepoint_remote"),
        blob("payment_basepoint_remote"),
        blob("htlc_basepoint_remote"),
        blob("delayed_payment_basepoint_remote"),
        blob("per_commit_remote"),
        blob("old_per_commit_remote"),
        opt_int("local_feerate_per_kw"),
        opt_int("remote_feerate_per_kw"),
        int("shachain_remote_id"),
        blob("shutdown_scriptpubkey_remote"),
        int("shutdown_keyidx_local"),
        opt_int("last_sent_commit_state"),
        opt_int("last_sent_commit_id"),
        blob("last_tx"),
        blob("last_sig"),
        opt_int("closing_fee_received"),
        blob("closing_sig_received"),
        int("first_blocknum"),
        int("last_was_revoke"),
        opt_int("in_payments_offered"),
        opt_int("in_payments_fulfilled"),
        opt_int("in_msatoshi_offered"),
        opt_int("in_msatoshi_fulfilled"),
        opt_int("out_payments_offered"),
        opt_int("out_payments_fulfilled"),
        opt_int("out_msatoshi_offered"),
        opt_int("out_msatoshi_fulfilled"),
        int("min_possible_feerate"),
        int("max_possible_feerate"),
        int("msatoshi_to_us_min"),
        int("msatoshi_to_us_max"),
        blob("future_per_commitment_point"),
        blob("last_sent_commit"),
        int("feerate_base"),
        int("feerate_ppm"),
        blob("remote_upfront_shutdown_script"),
        blob("remote_ann_node_sig"),
        blob("remote_ann_bitcoin_sig"),
        int("option_static_remotekey"),
        blob("shutdown_scriptpubkey_local"),
        opt_int("option_anchor_outputs"),
        blob("full_channel_id"),
        blob("funding_psbt"),
        int("closer"),
        int("state_change_reason"),
        blob("revocation_basepoint_local"),
        blob("payment_basepoint_local"),
        blob("htlc_basepoint_local"),
        blob("delayed_payment_basepoint_local"),
        blob("funding_pubkey_local"),
        blob("shutdown_wrong_txid"),
        int("shutdown_wrong_outnum"),
        int("local_static_remotekey_start"),
        int("remote_static_remotekey_start"),
    ],
)
.conflict_key(&["id"])
.serial("id")
.depends_on(&["peers"]);

pub const CHANNEL_FEERATES: TableDescriptor = TableDescriptor::new(
    "channel_feerates",
    &[int("channel_id"), int("hstate"), int("feerate_per_kw")],
)
.conflict_key(&["channel_id", "hstate"])
.depends_on(&["channels"]);

pub const CHANNEL_HTLCS: TableDescriptor = TableDescriptor::new(
    "channel_htlcs",
    &[
        int("id"),
        int("channel_id"),
        int("channel_htlc_id"),
        int("direction"),
        opt_int("origin_htlc"),
        int("msatoshi"),
        int("cltv_expiry"),
        blob("payment_hash"),
        blob("payment_key"),
        blob("routing_onion"),
        blob("failuremsg"),
        opt_int("malformed_onion"),
        int("hstate"),
        blob("shared_secret"),
        opt_int("received_time"),
        blob("localfailmsg"),
        opt_int("partid"),
        opt_int("we_filled"),
    ],
)
.conflict_key(&["id"])
.serial("id")
.depends_on(&["channels"]);

pub const TRANSACTIONS: TableDescriptor = TableDescriptor::new(
    "transactions",
    &[
        blob("id"),
        opt_int("blockheight"),
        opt_int("txindex"),
        blob("rawtx"),
        opt_int("type"),
        opt_int("channel_id"),
    ],
)
.conflict_key(&["id"])
.depends_on(&["blocks"]);

pub const TRANSACTION_ANNOTATIONS: TableDescriptor = TableDescriptor::new(
    "transaction_annotations",
    &[
        blob("txid"),
        int("idx"),
        int("location"),
        int("type"),
        opt_int("channel"),
    ],
)
.conflict_key(&["txid", "idx"])
.depends_on(&["transactions", "channels"]);

pub const CHANNELTXS: TableDescriptor = TableDescriptor::new(
    "channeltxs",
    &[
        int("id"),
        int("channel_id"),
        int("type"),
        blob("transaction_id"),
        int("input_num"),
        int("blockheight"),
    ],
)
.conflict_key(&["id"])
.serial("id")
.depends_on(&["channels", "transactions", "blocks"]);

pub const OUTPUTS: TableDescriptor = TableDescriptor::new(
    "outputs",
    &[
        blob("prev_out_tx"),
        int("prev_out_index"),
        int("value"),
        int("type"),
        int("status"),
        int("keyindex"),
        opt_int("channel_id"),
        blob("peer_id"),
        blob("commitment_point"),
        opt_int("confirmation_height"),
        opt_int("spend_height"),
        blob("scriptpubkey"),
        opt_int("reserved_til"),
        opt_int("option_anchor_outputs"),
    ],
)
.conflict_key(&["prev_out_tx", "prev_out_index"])
.depends_on(&["blocks"]);

pub const OFFERS: TableDescriptor = TableDescriptor::new(
    "offers",
    &[blob("offer_id"), text("bolt12"), text("label"), int("status")],
)
.conflict_key(&["offer_id"]);

pub const PAYMENTS: TableDescriptor = TableDescriptor::new(
    "payments",
    &[
        int("id"),
        int("timestamp"),
        int("status"),
        blob("payment_hash"),
        blob("destination"),
        int("msatoshi"),
        blob("payment_preimage"),
        blob("path_secrets"),
        blob("route_nodes"),
        blob("route_channels"),
        blob("failonionreply"),
        opt_int("faildestperm"),
        opt_int("failindex"),
        opt_int("failcode"),
        blob("failnode"),
        opt_text("failchannel"),
        blob("failupdate"),
        int("msatoshi_sent"),
        opt_text("faildetail"),
        opt_text("description"),
        opt_int("faildirection"),
        opt_text("bolt11"),
        int("total_msat"),
        int("partid"),
        blob("local_offer_id"),
    ],
)
.conflict_key(&["payment_hash", "partid"])
.serial("id")
.depends_on(&["offers"]);

pub const INVOICES: TableDescriptor = TableDescriptor::new(
    "invoices",
    &[
        int("id"),
        int("state"),
        opt_int("msatoshi"),
        blob("payment_hash"),
        blob("payment_key"),
        text("label"),
        int("expiry_time"),
        opt_int("pay_index"),
        opt_int("msatoshi_received"),
        opt_int("paid_timestamp"),
        text("bolt11"),
        opt_text("description"),
        blob("features"),
        blob("local_offer_id"),
    ],
)
.conflict_key(&["id"])
.serial("id")
.depends_on(&["offers"]);

pub const FORWARDED_PAYMENTS: TableDescriptor = TableDescriptor::new(
    "forwarded_payments",
    &[
        opt_int("in_htlc_id"),
        opt_int("out_htlc_id"),
        int("in_channel_scid"),
        opt_int("out_channel_scid"),
        int("in_msatoshi"),
        opt_int("out_msatoshi"),
        int("state"),
        int("received_time"),
        opt_int("resolved_time"),
        opt_int("failcode"),
    ],
)
.conflict_key(&["in_htlc_id", "out_htlc_id"])
.depends_on(&["channel_htlcs"]);

pub const SHACHAINS: TableDescriptor = TableDescriptor::new(
    "shachains",
    &[int("id"), int("min_index"), int("num_valid")],
)
.conflict_key(&["id"])
.serial("id");

pub const SHACHAIN_KNOWN: TableDescriptor = TableDescriptor::new(
    "shachain_known",
    &[int("shachain_id"), int("pos"), int("idx"), blob("hash")],
)
.conflict_key(&["shachain_id", "pos"])
.depends_on(&["shachains"]);

pub const UTXOSET: TableDescriptor = TableDescriptor::new(
    "utxoset",
    &[
        blob("txid"),
        int("outnum"),
        int("blockheight"),
        opt_int("spendheight"),
        int("txindex"),
        blob("scriptpubkey"),
        int("satoshis"),
    ],
)
.conflict_key(&["txid", "outnum"])
.depends_on(&["blocks"]);

pub const PENALTY_BASES: TableDescriptor = TableDescriptor::new(
    "penalty_bases",
    &[
        int("channel_id"),
        int("commitnum"),
        blob("txid"),
        int("outnum"),
        int("amount"),
    ],
)
.conflict_key(&["channel_id", "commitnum"])
.depends_on(&["channels"]);

/// Append-only log without a natural key.
pub const CHANNEL_STATE_CHANGES: TableDescriptor = TableDescriptor::new(
    "channel_state_changes",
    &[
        int("channel_id"),
        int("timestamp"),
        int("old_state"),
        int("new_state"),
        int("cause"),
        text("message"),
    ],
)
.depends_on(&["channels"]);

pub const CHANNEL_FUNDING_INFLIGHTS: TableDescriptor = TableDescriptor::new(
    "channel_funding_inflights",
    &[
        int("channel_id"),
        blob("funding_tx_id"),
        int("funding_tx_outnum"),
        int("funding_feerate"),
        int("funding_satoshi"),
        int("our_funding_satoshi"),
        blob("funding_psbt"),
        blob("last_tx"),
        blob("last_sig"),
        int("funding_tx_remote_sigs_received"),
    ],
)
.conflict_key(&["channel_id", "funding_tx_id"])
.depends_on(&["channels"]);

/// Every migrated table in foreign-key order. `version`, `db_upgrades`
/// and `htlc_sigs` are deliberately absent.
pub const LIGHTNINGD_TABLES: &[TableDescriptor] = &[
    VARS,
    BLOCKS,
    CHANNEL_CONFIGS,
    PEERS,
    CHANNELS,
    CHANNEL_FEERATES,
    CHANNEL_HTLCS,
    TRANSACTIONS,
    TRANSACTION_ANNOTATIONS,
    CHANNELTXS,
    OUTPUTS,
    OFFERS,
    PAYMENTS,
    INVOICES,
    FORWARDED_PAYMENTS,
    SHACHAINS,
    SHACHAIN_KNOWN,
    UTXOSET,
    PENALTY_BASES,
    CHANNEL_STATE_CHANGES,
    CHANNEL_FUNDING_INFLIGHTS,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_descriptor_is_valid() {
        for table in LIGHTNINGD_TABLES {
            table.validate().unwrap();
        }
    }

    #[test]
    fn test_serial_tables() {
        let serial: Vec<&str> = LIGHTNINGD_TABLES
            .iter()
            .filter(|t| t.serial.is_some())
            .map(|t| t.name)
            .collect();
        assert_eq!(
            serial,
            vec![
                "channel_configs",
                "peers",
                "channels",
                "channel_htlcs",
                "channeltxs",
                "payments",
                "invoices",
                "shachains"
            ]
        );
    }

    #[test]
    fn test_channels_column_count() {
        assert_eq!(CHANNELS.fields.len(), 75);
        assert_eq!(CHANNELS.fields[0].column, "id");
        assert_eq!(
            CHANNELS.fields.last().unwrap().column,
            "remote_static_remotekey_start"
        );
    }
}
