use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, anyhow};
use bytes::Bytes;
use tracing::{info, warn};
use vista_beacon_state::{BeaconStateView, ProcessSlotsOptions, PubkeyCache};
use vista_consensus_misc::misc::compute_start_slot_at_epoch;
use vista_network_spec::set_chain_config;

use crate::cli::{InspectConfig, ProcessSlotsConfig, ProofConfig, PubkeysConfig, StateArgs};

/// Install the chosen network and decode the state file against it.
pub fn load_state(args: &StateArgs, pubkeys: Arc<PubkeyCache>) -> anyhow::Result<BeaconStateView> {
    if set_chain_config(args.network.clone()).is_err() {
        warn!("Chain config was already set, keeping the existing one");
    }

    let bytes = fs::read(&args.state)
        .with_context(|| format!("Failed to read state from {}", args.state.display()))?;
    let fork = match args.fork {
        Some(fork) => fork,
        None => args
            .network
            .fork_name_from_state_bytes(&bytes)
            .ok_or_else(|| anyhow!("{} is too short to be a state", args.state.display()))?,
    };
    info!(%fork, path = %args.state.display(), "Loading beacon state");

    BeaconStateView::from_bytes(fork, Bytes::from(bytes), pubkeys)
        .with_context(|| format!("Failed to decode {fork} state"))
}

pub fn run_inspect(config: InspectConfig) -> anyhow::Result<()> {
    let state = load_state(&config.state, Arc::new(PubkeyCache::new()))?;
    let header = state.latest_block_header();

    println!("fork:                  {}", state.fork_name());
    println!("slot:                  {}", state.slot());
    println!("epoch:                 {}", state.epoch());
    println!("state root:            {}", state.hash_tree_root()?);
    println!("genesis time:          {}", state.genesis_time());
    println!("genesis validators:    {}", state.genesis_validators_root());
    println!("latest header slot:    {}", header.slot);
    println!("latest header parent:  {}", header.parent_root);
    println!("validators:            {}", state.validator_count()?);
    println!("active validators:     {}", state.active_validator_count()?);

    let justified = state.current_justified_checkpoint();
    let finalized = state.finalized_checkpoint();
    println!("justified:             {} @ {}", justified.root, justified.epoch);
    println!("finalized:             {} @ {}", finalized.root, finalized.epoch);
    let (unrealized_justified, unrealized_finalized) = state.compute_unrealized_checkpoints()?;
    println!(
        "unrealized justified:  {} @ {}",
        unrealized_justified.root, unrealized_justified.epoch
    );
    println!(
        "unrealized finalized:  {} @ {}",
        unrealized_finalized.root, unrealized_finalized.epoch
    );

    if state.fork_name().is_electra_or_later() {
        println!("pending deposits:      {}", state.pending_deposits_count()?);
        println!(
            "pending withdrawals:   {}",
            state.pending_partial_withdrawals_count()?
        );
        println!("pending consolidations: {}", state.pending_consolidations_count()?);
    }

    if config.proposers {
        let start_slot = compute_start_slot_at_epoch(state.epoch());
        for (offset, proposer) in state.current_proposers()?.into_iter().enumerate() {
            println!("proposer @ {}: {proposer}", start_slot + offset as u64);
        }
    }
    Ok(())
}

pub fn run_proof(config: ProofConfig) -> anyhow::Result<()> {
    let state = load_state(&config.state, Arc::new(PubkeyCache::new()))?;
    println!("state root: {}", state.hash_tree_root()?);

    if config.finalized || config.gindices.len() == 1 {
        let gindex = match config.finalized {
            true => state.finalized_root_gindex(),
            false => config.gindices[0],
        };
        let leaf = state.merkle_nodes(&[gindex])?[0];
        println!("gindex {gindex}: {leaf}");
        for (depth, sibling) in state.get_single_proof(gindex)?.iter().enumerate() {
            println!("  branch[{depth}]: {sibling}");
        }
        return Ok(());
    }

    let proof = state
        .create_multiproof(&config.gindices)
        .context("Failed to build multiproof")?;
    for gindex in &config.gindices {
        println!("leaf {gindex}: {}", proof.leaves[gindex]);
    }
    for (gindex, helper) in &proof.proofs {
        println!("helper {gindex}: {helper}");
    }
    Ok(())
}

pub fn run_process_slots(config: ProcessSlotsConfig) -> anyhow::Result<()> {
    let mut state = load_state(&config.state, Arc::new(PubkeyCache::new()))?;
    let next = state
        .process_slots(
            config.slot,
            ProcessSlotsOptions {
                transfer_cache: true,
            },
        )
        .with_context(|| format!("Failed to advance to slot {}", config.slot))?;

    println!("slot:       {}", next.slot());
    println!("state root: {}", next.hash_tree_root()?);
    if let Some(output) = config.output {
        write_state(&next, &output)?;
    }
    Ok(())
}

fn write_state(state: &BeaconStateView, output: &Path) -> anyhow::Result<()> {
    fs::write(output, state.as_ssz_bytes())
        .with_context(|| format!("Failed to write state to {}", output.display()))?;
    info!(path = %output.display(), slot = state.slot(), "Wrote beacon state");
    Ok(())
}

pub fn run_pubkeys(config: PubkeysConfig) -> anyhow::Result<()> {
    let cache = match config.output.exists() {
        true => PubkeyCache::load(&config.output)?,
        false => PubkeyCache::new(),
    };
    let known = cache.len();
    let state = load_state(&config.state, Arc::new(cache))?;
    state.sync_pubkey_cache()?;

    let cache = state.pubkey_cache();
    cache.save(&config.output)?;
    println!(
        "indexed {} pubkeys ({} new) into {}",
        cache.len(),
        cache.len().saturating_sub(known),
        config.output.display()
    );
    Ok(())
}
