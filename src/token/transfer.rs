//! Two-phase token transfers and merges.
//!
//! ```text
//! Selecting ──▶ RouteChecking ──▶ Transferring ──▶ Committed
//!     │
//!     └──▶ Merging ──▶ fail (TooManyTokenInputs, retry later)
//! ```
//!
//! Phase 1 broadcasts a route-check transaction proving the output amounts.
//! Phase 2 spends the token inputs together with the route-check output.
//! Each phase is a separate guarded use of the sender's fee wallet.

use crate::builder::{RouteCheckRequest, TransferRequest};
use crate::chain::keys::{parse_address, SigningKey};
use crate::chain::transaction::{SignedTx, TxError};
use crate::error::{RelayError, RelayResult};
use crate::token::orchestrator::TokenOrchestrator;
use crate::token::route::{RouteCheckShape, ShapeRejection, MAX_TOKEN_INPUTS};
use crate::token::types::{TokenAmount, TokenReceiver, TokenUtxo};
use crate::wallet::FeeWallet;

/// Inputs chosen to cover a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSelection {
    pub inputs: Vec<TokenUtxo>,
    pub total: TokenAmount,
}

/// Take the shortest prefix of `available` whose amounts cover `requested`.
pub fn select_inputs(available: &[TokenUtxo], requested: TokenAmount) -> RelayResult<InputSelection> {
    let mut total = TokenAmount::ZERO;
    for (i, utxo) in available.iter().enumerate() {
        total = total
            .checked_add(utxo.token_amount)
            .ok_or_else(|| RelayError::InvalidRequest("token amounts overflow".to_string()))?;
        if total >= requested {
            return Ok(InputSelection {
                inputs: available[..=i].to_vec(),
                total,
            });
        }
    }
    Err(RelayError::InsufficientTokenBalance {
        available: total.0,
        requested: requested.0,
    })
}

/// Receivers plus a change output to `sender` when the inputs exceed the request.
pub fn with_change(
    receivers: &[TokenReceiver],
    selected: TokenAmount,
    requested: TokenAmount,
    sender: &str,
) -> Vec<TokenReceiver> {
    let mut outputs = receivers.to_vec();
    if let Some(change) = selected.checked_sub(requested).filter(|c| !c.is_zero()) {
        outputs.push(TokenReceiver {
            address: sender.to_string(),
            amount: change,
        });
    }
    outputs
}

/// Inputs, outputs and layout of one two-phase spend.
struct TransferPlan<'a> {
    token_id: &'a str,
    sender: &'a SigningKey,
    inputs: Vec<TokenUtxo>,
    outputs: Vec<TokenReceiver>,
    shape: RouteCheckShape,
}

impl TokenOrchestrator {
    /// Send tokens from `sender` to `receivers`. Returns the transfer txid.
    pub async fn transfer(
        &self,
        token_id: &str,
        sender: &SigningKey,
        receivers: &[TokenReceiver],
    ) -> RelayResult<String> {
        if receivers.is_empty() {
            return Err(RelayError::InvalidRequest("receivers must not be empty".to_string()));
        }
        let mut requested = TokenAmount::ZERO;
        for receiver in receivers {
            parse_address(&receiver.address, self.network)?;
            if receiver.amount.is_zero() {
                return Err(RelayError::InvalidRequest(format!(
                    "amount for {} must be positive",
                    receiver.address
                )));
            }
            requested = requested
                .checked_add(receiver.amount)
                .ok_or_else(|| RelayError::InvalidRequest("requested amount overflows".to_string()))?;
        }

        self.observe("transfer", async {
            let holder = sender.address_string();
            let available = self.tokens.list(&holder, token_id).await?;
            let selection = select_inputs(&available, requested)?;
            let outputs = with_change(receivers, selection.total, requested, &holder);

            let input_count = selection.inputs.len();
            let shape = match RouteCheckShape::classify(input_count, outputs.len()) {
                Ok(shape) => shape,
                Err(ShapeRejection::NeedsMerge) => {
                    tracing::info!(token_id, holder = %holder, inputs = input_count, state = "merging", "Too many token inputs, merging");
                    match self.merge(token_id, sender).await {
                        Ok(txid) => tracing::info!(token_id, merge = %txid, "Merge broadcast, transfer must be retried"),
                        Err(e) => tracing::warn!(token_id, error = %e, "Merge before transfer failed"),
                    }
                    return Err(RelayError::TooManyTokenInputs(input_count));
                }
                Err(ShapeRejection::Unsupported) => {
                    return Err(RelayError::UnsupportedShape {
                        inputs: input_count,
                        outputs: outputs.len(),
                    });
                }
            };

            self.run_two_phase(TransferPlan {
                token_id,
                sender,
                inputs: selection.inputs,
                outputs,
                shape,
            })
            .await
        })
        .await
    }

    /// Consolidate up to twenty of `sender`'s outputs into one. Returns the merge txid.
    pub async fn merge(&self, token_id: &str, sender: &SigningKey) -> RelayResult<String> {
        self.observe("merge", async {
            let holder = sender.address_string();
            let mut inputs = self.tokens.list(&holder, token_id).await?;
            inputs.truncate(MAX_TOKEN_INPUTS);
            if inputs.len() < 2 {
                return Err(RelayError::InvalidRequest(format!(
                    "{} holds {} output(s) of {}, nothing to merge",
                    holder,
                    inputs.len(),
                    token_id
                )));
            }

            let mut total = TokenAmount::ZERO;
            for input in &inputs {
                total = total
                    .checked_add(input.token_amount)
                    .ok_or_else(|| RelayError::InvalidRequest("token amounts overflow".to_string()))?;
            }
            let outputs = vec![TokenReceiver {
                address: holder,
                amount: total,
            }];

            self.run_two_phase(TransferPlan {
                token_id,
                sender,
                inputs,
                outputs,
                shape: RouteCheckShape::TwentyToThree,
            })
            .await
        })
        .await
    }

    async fn run_two_phase(&self, plan: TransferPlan<'_>) -> RelayResult<String> {
        let wallet = self.wallet_for(&plan.sender.address_string())?;
        let payer: &FeeWallet = &wallet;
        let plan = &plan;
        let sender_pk = plan.sender.public_key_hex();
        let sender_pk = sender_pk.as_str();

        tracing::info!(
            token_id = plan.token_id,
            inputs = plan.inputs.len(),
            outputs = plan.outputs.len(),
            shape = %plan.shape,
            state = "route_checking",
            "Starting route check"
        );
        let route_check = wallet
            .try_use_utxos(self.fees.route_check(plan.shape), |utxos| async move {
                let request = RouteCheckRequest {
                    sender_pk: sender_pk.to_string(),
                    receivers: plan.outputs.clone(),
                    ft_utxos: plan.inputs.clone(),
                    route_check_type: plan.shape,
                    fee: self.fee_inputs(payer, utxos),
                };
                let template = self.builder.route_check(&request).await?;
                let signed = self.sign(&template, payer, plan.sender)?;
                self.broadcast("route_check", &signed).await?;
                payer.credit_change(&signed).await?;
                Ok(signed)
            })
            .await?;

        tracing::info!(
            token_id = plan.token_id,
            route_check = %route_check.txid,
            state = "transferring",
            "Route check broadcast"
        );
        let route_check = &route_check;
        let estimate = self
            .fees
            .transfer(plan.shape, plan.inputs.len(), plan.outputs.len());
        let signed = wallet
            .try_use_utxos(estimate, |utxos| async move {
                let request = TransferRequest {
                    sender_pk: sender_pk.to_string(),
                    receivers: plan.outputs.clone(),
                    ft_utxos: plan.inputs.clone(),
                    route_check_type: plan.shape,
                    route_check_hex: route_check.hex.clone(),
                    fee: self.fee_inputs(payer, utxos),
                };
                let template = self.builder.transfer(&request).await?;
                let signed = self.sign(&template, payer, plan.sender)?;
                let created = token_outputs(plan, &signed)?;
                self.broadcast("transfer", &signed).await?;
                let credited = payer.credit_change(&signed).await;
                self.commit(plan, &signed, created).await?;
                credited?;
                Ok(signed)
            })
            .await?;

        Ok(signed.txid)
    }

    /// Record the new outputs and drop the spent ones.
    ///
    /// Runs after the broadcast, so every write is attempted and the first
    /// failure is returned.
    async fn commit(
        &self,
        plan: &TransferPlan<'_>,
        signed: &SignedTx,
        created: Vec<TokenUtxo>,
    ) -> RelayResult<()> {
        let mut failure = self.tokens.insert_many(&created).await.err();
        if let Some(e) = &failure {
            tracing::error!(txid = %signed.txid, error = %e, "Failed to persist token outputs");
        }
        for input in &plan.inputs {
            if let Err(e) = self
                .tokens
                .remove(&input.holder_address, plan.token_id, &input.tx_id, input.output_index)
                .await
            {
                tracing::error!(tx_id = %input.tx_id, error = %e, "Failed to delete spent token output");
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            return Err(e.into());
        }
        tracing::info!(
            token_id = plan.token_id,
            txid = %signed.txid,
            created = created.len(),
            spent = plan.inputs.len(),
            state = "committed",
            "Transfer committed"
        );
        Ok(())
    }
}

/// One token output per planned receiver, index-aligned with the transaction outputs.
///
/// Every new output names the first consumed input as its predecessor.
fn token_outputs(plan: &TransferPlan<'_>, signed: &SignedTx) -> RelayResult<Vec<TokenUtxo>> {
    let first = plan
        .inputs
        .first()
        .ok_or_else(|| RelayError::InvalidRequest("transfer without inputs".to_string()))?;

    plan.outputs
        .iter()
        .enumerate()
        .map(|(index, receiver)| {
            let out = signed.output(index).ok_or_else(|| {
                TxError::Template(format!(
                    "transfer template has {} outputs, expected at least {}",
                    signed.tx.output.len(),
                    plan.outputs.len()
                ))
            })?;
            Ok(TokenUtxo {
                token_id: plan.token_id.to_string(),
                tx_id: signed.txid.clone(),
                output_index: index as u32,
                satoshis: out.value.to_sat(),
                locking_script: hex::encode(out.script_pubkey.as_bytes()),
                holder_address: receiver.address.clone(),
                token_amount: receiver.amount,
                raw_tx: signed.hex.clone(),
                predecessor_tx_id: first.tx_id.clone(),
                predecessor_output_index: first.output_index,
                predecessor_raw_tx: first.raw_tx.clone(),
                predecessor_holder_address: first.holder_address.clone(),
                predecessor_token_amount: first.token_amount,
            })
        })
        .collect()
}
