//! Default business rules over chain params and revert options.

use crate::domain::{Xmsg, XmsgKind};
use crate::ports::{Eligibility, RevertFeasibility, XmsgPolicy};
use xc_01_observer::ChainParams;

/// Policy used by the node.
///
/// - an inbound is rejected when its receiver is empty, its receiver chain
///   is unknown or unsupported, or it targets its own origin chain
/// - a revert is feasible only for transfers carrying revert options whose
///   origin chain is still supported and whose amount covers the revert fee
///   (`gas_limit * gas_price` on the origin chain); the refund is the rest
#[derive(Clone, Debug, Default)]
pub struct DefaultXmsgPolicy;

impl DefaultXmsgPolicy {
    /// Create the policy.
    pub fn new() -> Self {
        Self
    }
}

impl XmsgPolicy for DefaultXmsgPolicy {
    fn check_inbound(&self, xmsg: &Xmsg, receiver_params: Option<&ChainParams>) -> Eligibility {
        let inbound = &xmsg.inbound;
        if inbound.receiver.trim().is_empty() {
            return Eligibility::Rejected("empty receiver".to_string());
        }
        if inbound.receiver_chain_id == inbound.sender_chain_id {
            return Eligibility::Rejected(format!(
                "receiver chain {} is the origin chain",
                inbound.receiver_chain_id
            ));
        }
        match receiver_params {
            Some(params) if params.is_supported => Eligibility::Eligible,
            _ => Eligibility::Rejected(format!(
                "receiver chain {} is not supported",
                inbound.receiver_chain_id
            )),
        }
    }

    fn check_revert(&self, xmsg: &Xmsg, origin_params: Option<&ChainParams>) -> RevertFeasibility {
        if xmsg.kind == XmsgKind::TssMigration {
            return RevertFeasibility::Infeasible("fund migration".to_string());
        }
        let Some(options) = &xmsg.inbound.revert_options else {
            return RevertFeasibility::Infeasible("no revert options".to_string());
        };
        let Some(params) = origin_params.filter(|p| p.is_supported) else {
            return RevertFeasibility::Infeasible(format!(
                "origin chain {} is not supported",
                xmsg.inbound.sender_chain_id
            ));
        };
        let gas_limit = options.revert_gas_limit.unwrap_or(params.outbound_gas_limit);
        let Some(fee) = u128::from(gas_limit).checked_mul(params.gas_price) else {
            return RevertFeasibility::Infeasible(format!(
                "revert fee overflows: gas limit {} at price {}",
                gas_limit, params.gas_price
            ));
        };
        let Some(amount) = xmsg.inbound.amount.checked_sub(fee) else {
            return RevertFeasibility::Infeasible(format!(
                "insufficient funds to cover revert fee: amount {} < fee {}",
                xmsg.inbound.amount, fee
            ));
        };
        RevertFeasibility::Feasible {
            receiver: options
                .revert_address
                .clone()
                .unwrap_or_else(|| xmsg.inbound.sender.clone()),
            gas_limit,
            amount,
        }
    }
}
