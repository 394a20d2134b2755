//! Block-template refresh: fetches the current job from the active
//! upstream and atomically replaces [`ProxyState`]'s template, per spec §4.2.

use proxy_core::error::UpstreamError;
use proxy_core::types::BlockTemplate;
use tracing::info;

use crate::state::ProxyState;

/// Refresh the cached block template from the currently selected upstream.
///
/// Any RPC error aborts the refresh leaving the previous template intact;
/// the caller (scheduler or a solo-mode share accept) is responsible for
/// logging and retrying on the next tick.
pub async fn refresh(state: &ProxyState) -> Result<(), UpstreamError> {
    let upstream = state.selector.current();
    let (header, seed, target) = upstream.get_work().await?;

    let current = state.template();
    if header == current.header {
        return Ok(());
    }

    let pending = upstream.get_pending_block().await?;
    let new_height = pending.height;
    let new_template = BlockTemplate::advance(
        Some(&current),
        header,
        seed,
        target,
        pending.difficulty,
        pending.height,
    );

    state.replace_template(new_template);

    if new_height != current.height {
        info!(upstream = %upstream.name, height = new_height, "new block to mine");
    }
    Ok(())
}
