//! Mint orchestration.
//!
//! One `adopt(amount)` job at a time moves through
//! `Idle → CheckingState → Estimating → Sending → AwaitingConfirmation →
//! Confirmed`, or to `Failed` from any of those, and always lands back on
//! `Idle`. A failed job keeps its error on the idle job until the next mint
//! or an explicit `clear_error`.

pub mod gas;

use std::sync::Mutex;

use log::{debug, info, warn};
use strum_macros::Display;

use crate::{
    collection::CollectionState,
    contract::{CallParams, ContractHandle, SendParams, TxEvent, TxEvents},
    error::{PaperCatsError, Result},
    utils::{
        subscribers::{Subscribers, Subscription},
        units::format_ether,
    },
    wallet::WalletState,
};

use gas::GasPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum MintPhase {
    #[default]
    Idle,
    CheckingState,
    Estimating,
    Sending,
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MintJob {
    pub amount: u32,
    pub phase: MintPhase,
    pub transaction_hash: Option<String>,
    pub confirmations: u64,
    pub error: Option<PaperCatsError>,
}

impl MintJob {
    pub fn in_flight(&self) -> bool {
        self.phase != MintPhase::Idle
    }

    /// Whether the view should offer a "get funds" link.
    pub fn needs_funds(&self) -> bool {
        self.error.as_ref().map_or(false, PaperCatsError::needs_funds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub transaction_hash: Option<String>,
    /// Ids carried by the confirmation's Transfer events.
    pub token_ids: Vec<String>,
    /// How many of them were new to the owned set.
    pub added: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MintOutcome {
    Minted(MintReceipt),
    /// Another job was in flight; nothing was done.
    Rejected(MintJob),
}

pub struct MintOrchestrator {
    job: Mutex<MintJob>,
    transitions: Subscribers<MintJob>,
    collection: CollectionState,
    gas: GasPolicy,
}

impl MintOrchestrator {
    pub fn new(collection: CollectionState, gas: GasPolicy) -> Self {
        Self {
            job: Mutex::new(MintJob::default()),
            transitions: Subscribers::new(),
            collection,
            gas,
        }
    }

    pub fn job(&self) -> MintJob {
        self.job.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Called with the job after every transition.
    pub fn on_transition<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MintJob) + Send + Sync + 'static,
    {
        self.transitions.subscribe(callback)
    }

    pub fn clear_error(&self) {
        self.update(|job| {
            if job.error.is_none() || job.in_flight() {
                return false;
            }
            job.error = None;
            true
        });
    }

    pub async fn mint(
        &self,
        contract: &ContractHandle,
        wallet: &WalletState,
        amount: u32,
    ) -> Result<MintOutcome> {
        if amount == 0 {
            return Err(PaperCatsError::InvalidAmount(
                "must mint at least one cat".to_string(),
            ));
        }

        let claimed = self.update(|job| {
            if job.in_flight() {
                return false;
            }
            *job = MintJob {
                amount,
                phase: MintPhase::CheckingState,
                ..MintJob::default()
            };
            true
        });
        if !claimed {
            let current = self.job();
            debug!("⛔ [MINT] rejected mint of {}: {} in progress", amount, current.phase);
            return Ok(MintOutcome::Rejected(current));
        }

        info!("🚀 [MINT] minting {} for {}", amount, wallet.address);
        // a dropped future must still hand the job back to Idle
        let mut claim = ClaimGuard {
            orchestrator: self,
            armed: true,
        };
        let result = self.run(contract, wallet, amount).await;
        claim.armed = false;

        match result {
            Ok(receipt) => {
                info!(
                    "✅ [MINT] confirmed {:?}: {:?} ({} new)",
                    receipt.transaction_hash, receipt.token_ids, receipt.added
                );
                self.update(|job| {
                    *job = MintJob::default();
                    true
                });
                Ok(MintOutcome::Minted(receipt))
            }
            Err(e) => {
                warn!("❌ [MINT] mint of {} failed: {}", amount, e);
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Failed with `error`, then back to Idle keeping it.
    fn fail(&self, error: PaperCatsError) {
        self.update(|job| {
            job.phase = MintPhase::Failed;
            job.transaction_hash = None;
            job.error = Some(error);
            true
        });
        self.update(|job| {
            job.phase = MintPhase::Idle;
            job.amount = 0;
            true
        });
    }

    async fn run(
        &self,
        contract: &ContractHandle,
        wallet: &WalletState,
        amount: u32,
    ) -> Result<MintReceipt> {
        let provider = match (&wallet.provider, wallet.address.is_empty()) {
            (Some(provider), false) => provider.clone(),
            _ => return Err(PaperCatsError::WalletDisconnected),
        };
        let balance = wallet.balance_wei()?;

        /* -------- pre-flight -------------------------------------- */
        let (current_gas_price, paused, unit_price) = tokio::try_join!(
            provider.gas_price(),
            contract.paused(),
            contract.price(),
        )?;

        let cost = unit_price.checked_mul(amount as u128).ok_or_else(|| {
            PaperCatsError::InvalidAmount(format!("{amount} x {unit_price} wei overflows"))
        })?;
        if cost > balance {
            return Err(PaperCatsError::InsufficientFunds { cost, balance });
        }
        if paused {
            return Err(PaperCatsError::Paused);
        }
        debug!(
            "💰 [MINT] cost {} of balance {}",
            format_ether(cost),
            format_ether(balance)
        );

        /* -------- estimate ---------------------------------------- */
        self.advance(MintPhase::Estimating);
        let estimate = contract
            .estimate_adopt_gas(
                amount,
                CallParams {
                    from: wallet.address.clone(),
                    value: cost,
                },
            )
            .await?;

        /* -------- send -------------------------------------------- */
        let send = SendParams {
            from: wallet.address.clone(),
            value: cost,
            gas: self.gas.gas_limit(estimate)?,
            gas_price: self.gas.gas_price(current_gas_price)?,
        };
        self.advance(MintPhase::Sending);
        debug!("⛽ [MINT] sending with gas {} @ {}", send.gas, send.gas_price);
        let events = contract.send_adopt(amount, send).await?;

        self.await_confirmation(events).await
    }

    async fn await_confirmation(&self, mut events: TxEvents) -> Result<MintReceipt> {
        let mut transaction_hash = None;

        while let Some(event) = events.recv().await {
            match event {
                TxEvent::Sent => debug!("📤 [MINT] transaction sent"),
                TxEvent::TransactionHash(hash) => {
                    info!("🧾 [MINT] transaction hash {}", hash);
                    transaction_hash = Some(hash.clone());
                    self.update(|job| {
                        job.phase = MintPhase::AwaitingConfirmation;
                        job.transaction_hash = Some(hash);
                        true
                    });
                }
                TxEvent::Confirmation { number, detail } => {
                    let token_ids = detail.minted_token_ids();
                    if token_ids.is_empty() {
                        warn!("⚠️ [MINT] confirmation {} carried no Transfer events", number);
                    }
                    let added = self.collection.record_minted(&token_ids);
                    self.update(|job| {
                        job.phase = MintPhase::Confirmed;
                        job.confirmations = number;
                        true
                    });
                    return Ok(MintReceipt {
                        transaction_hash,
                        token_ids,
                        added,
                    });
                }
                TxEvent::Error(message) => return Err(PaperCatsError::ContractCall(message)),
            }
        }

        Err(PaperCatsError::ContractCall(
            "transaction events ended before confirmation".to_string(),
        ))
    }

    fn advance(&self, phase: MintPhase) {
        self.update(|job| {
            job.phase = phase;
            true
        });
    }

    /// Apply `change` under the lock and notify observers if it reports a
    /// modification. Returns that report.
    fn update<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut MintJob) -> bool,
    {
        let snapshot = {
            let mut job = self.job.lock().unwrap_or_else(|e| e.into_inner());
            if !change(&mut job) {
                return false;
            }
            job.clone()
        };
        debug!("🔄 [MINT] -> {}", snapshot.phase);
        self.transitions.notify(&snapshot);
        true
    }
}

struct ClaimGuard<'a> {
    orchestrator: &'a MintOrchestrator,
    armed: bool,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("⚠️ [MINT] mint abandoned before it settled");
            self.orchestrator
                .fail(PaperCatsError::ContractCall("mint abandoned".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{provider, transfer_detail, MockContract};
    use std::sync::Arc;
    use tokio::sync::Notify;

    const ONE_ETHER: &str = "1000000000000000000";

    fn wallet(balance: &str) -> WalletState {
        WalletState {
            address: "0xabc".into(),
            balance: balance.into(),
            provider: Some(provider()),
        }
    }

    fn orchestrator() -> (
        Arc<MintOrchestrator>,
        CollectionState,
        Arc<Mutex<Vec<MintPhase>>>,
        Subscription,
    ) {
        let collection = CollectionState::new();
        let orchestrator = Arc::new(MintOrchestrator::new(collection.clone(), GasPolicy::default()));
        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = phases.clone();
        let sub = orchestrator.on_transition(move |job| sink.lock().unwrap().push(job.phase));
        (orchestrator, collection, phases, sub)
    }

    #[tokio::test]
    async fn test_happy_path() {
        let mock = Arc::new(MockContract::new());
        let contract: ContractHandle = mock.clone();
        let (orchestrator, collection, phases, _sub) = orchestrator();

        let outcome = orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await.unwrap();
        let receipt = match outcome {
            MintOutcome::Minted(receipt) => receipt,
            other => panic!("expected a mint, got {other:?}"),
        };
        assert_eq!(receipt.token_ids, vec!["42"]);
        assert_eq!(receipt.added, 1);
        assert_eq!(receipt.transaction_hash.as_deref(), Some("0xhash"));

        assert!(collection.owned().contains("42"));
        let job = orchestrator.job();
        assert_eq!(job.phase, MintPhase::Idle);
        assert_eq!(job.error, None);

        let sent = mock.last_send.lock().unwrap().clone().unwrap();
        assert_eq!(sent.from, "0xabc");
        assert_eq!(sent.value, mock.price);
        assert_eq!(sent.gas, 25_200);
        assert_eq!(sent.gas_price, 1_200_000_000);
        assert_eq!(mock.sends(), 1);

        assert_eq!(
            *phases.lock().unwrap(),
            vec![
                MintPhase::CheckingState,
                MintPhase::Estimating,
                MintPhase::Sending,
                MintPhase::AwaitingConfirmation,
                MintPhase::Confirmed,
                MintPhase::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_insufficient_funds_sends_nothing() {
        let mut mock = MockContract::new();
        mock.price = 60;
        let mock = Arc::new(mock);
        let contract: ContractHandle = mock.clone();
        let (orchestrator, collection, phases, _sub) = orchestrator();

        let err = orchestrator.mint(&contract, &wallet("100"), 2).await.unwrap_err();
        assert_eq!(err, PaperCatsError::InsufficientFunds { cost: 120, balance: 100 });
        assert_eq!(mock.estimates(), 0);
        assert_eq!(mock.sends(), 0);
        assert!(collection.owned().is_empty());

        let job = orchestrator.job();
        assert_eq!(job.phase, MintPhase::Idle);
        assert!(job.needs_funds());
        assert_eq!(
            *phases.lock().unwrap(),
            vec![MintPhase::CheckingState, MintPhase::Failed, MintPhase::Idle]
        );
    }

    #[tokio::test]
    async fn test_paused_sends_nothing() {
        let mut mock = MockContract::new();
        mock.paused = true;
        let mock = Arc::new(mock);
        let contract: ContractHandle = mock.clone();
        let (orchestrator, _, _, _sub) = orchestrator();

        let err = orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await.unwrap_err();
        assert_eq!(err, PaperCatsError::Paused);
        assert!(err.to_string().contains("paused"));
        assert_eq!(mock.sends(), 0);

        let job = orchestrator.job();
        assert_eq!(job.error, Some(PaperCatsError::Paused));
        assert!(!job.needs_funds());
    }

    #[tokio::test]
    async fn test_second_request_is_rejected_while_in_flight() {
        let release = Arc::new(Notify::new());
        let mut mock = MockContract::new();
        mock.release = Some(release.clone());
        let mock = Arc::new(mock);
        let contract: ContractHandle = mock.clone();
        let (orchestrator, collection, _, _sub) = orchestrator();

        let first = {
            let orchestrator = orchestrator.clone();
            let contract = contract.clone();
            tokio::spawn(async move { orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await })
        };
        while orchestrator.job().phase != MintPhase::Sending || mock.sends() == 0 {
            tokio::task::yield_now().await;
        }

        let second = orchestrator.mint(&contract, &wallet(ONE_ETHER), 3).await.unwrap();
        match second {
            MintOutcome::Rejected(job) => {
                assert_eq!(job.amount, 1);
                assert_eq!(job.phase, MintPhase::Sending);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(mock.sends(), 1);
        assert!(collection.owned().is_empty());

        release.notify_one();
        assert!(matches!(first.await.unwrap(), Ok(MintOutcome::Minted(_))));
        assert_eq!(mock.sends(), 1);
        assert_eq!(collection.owned().sorted(), vec!["42"]);
    }

    #[tokio::test]
    async fn test_duplicate_confirmation_is_idempotent() {
        let mut mock = MockContract::new();
        let confirmation = TxEvent::Confirmation {
            number: 1,
            detail: transfer_detail(&["42"]),
        };
        mock.events = vec![
            TxEvent::TransactionHash("0xhash".into()),
            confirmation.clone(),
            confirmation,
        ];
        let contract: ContractHandle = Arc::new(mock);
        let (orchestrator, collection, _, _sub) = orchestrator();
        collection.owned().replace(vec!["7".into()]);

        orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await.unwrap();
        // the same receipt again, as a racing provider would deliver it
        let again = orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await.unwrap();
        match again {
            MintOutcome::Minted(receipt) => assert_eq!(receipt.added, 0),
            other => panic!("expected a mint, got {other:?}"),
        }
        assert_eq!(collection.owned().sorted(), vec!["7", "42"]);
    }

    #[tokio::test]
    async fn test_provider_error_event_fails_job() {
        let mut mock = MockContract::new();
        mock.events = vec![
            TxEvent::Sent,
            TxEvent::TransactionHash("0xdead".into()),
            TxEvent::Error("User denied transaction signature".into()),
        ];
        let contract: ContractHandle = Arc::new(mock);
        let (orchestrator, collection, phases, _sub) = orchestrator();

        let err = orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await.unwrap_err();
        assert!(matches!(err, PaperCatsError::ContractCall(_)));
        let job = orchestrator.job();
        assert_eq!(job.phase, MintPhase::Idle);
        assert_eq!(job.transaction_hash, None);
        assert!(job.error.is_some());
        assert!(collection.owned().is_empty());
        assert!(phases.lock().unwrap().contains(&MintPhase::AwaitingConfirmation));

        orchestrator.clear_error();
        assert_eq!(orchestrator.job().error, None);
    }

    #[tokio::test]
    async fn test_estimate_failure_mentioning_funds() {
        let mut mock = MockContract::new();
        mock.estimate = Err(PaperCatsError::ContractCall(
            "insufficient funds for gas * price + value".into(),
        ));
        let mock = Arc::new(mock);
        let contract: ContractHandle = mock.clone();
        let (orchestrator, _, _, _sub) = orchestrator();

        orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await.unwrap_err();
        assert!(orchestrator.job().needs_funds());
        assert_eq!(mock.sends(), 0);

        // a failed job does not block the next one
        let healthy: ContractHandle = Arc::new(MockContract::new());
        assert!(matches!(
            orchestrator.mint(&healthy, &wallet(ONE_ETHER), 1).await,
            Ok(MintOutcome::Minted(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_zero_and_disconnected() {
        let contract: ContractHandle = Arc::new(MockContract::new());
        let (orchestrator, _, phases, _sub) = orchestrator();

        assert!(matches!(
            orchestrator.mint(&contract, &wallet(ONE_ETHER), 0).await,
            Err(PaperCatsError::InvalidAmount(_))
        ));
        assert!(phases.lock().unwrap().is_empty());

        assert_eq!(
            orchestrator.mint(&contract, &WalletState::default(), 1).await,
            Err(PaperCatsError::WalletDisconnected)
        );
        assert_eq!(orchestrator.job().phase, MintPhase::Idle);
    }

    #[tokio::test]
    async fn test_stream_closing_early_fails() {
        let mut mock = MockContract::new();
        mock.events = vec![TxEvent::Sent];
        let contract: ContractHandle = Arc::new(mock);
        let (orchestrator, _, _, _sub) = orchestrator();

        let err = orchestrator.mint(&contract, &wallet(ONE_ETHER), 1).await.unwrap_err();
        assert!(matches!(err, PaperCatsError::ContractCall(_)));
    }

    #[tokio::test]
    async fn test_abandoned_mint_returns_to_idle() {
        let mut mock = MockContract::new();
        mock.release = Some(Arc::new(Notify::new()));
        let contract: ContractHandle = Arc::new(mock);
        let (orchestrator, collection, phases, _sub) = orchestrator();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            orchestrator.mint(&contract, &wallet(ONE_ETHER), 1),
        )
        .await;
        assert!(timed_out.is_err());

        let job = orchestrator.job();
        assert_eq!(job.phase, MintPhase::Idle);
        assert_eq!(
            job.error,
            Some(PaperCatsError::ContractCall("mint abandoned".into()))
        );
        assert_eq!(
            phases.lock().unwrap().iter().rev().take(2).copied().collect::<Vec<_>>(),
            vec![MintPhase::Idle, MintPhase::Failed]
        );

        let healthy: ContractHandle = Arc::new(MockContract::new());
        assert!(matches!(
            orchestrator.mint(&healthy, &wallet(ONE_ETHER), 1).await,
            Ok(MintOutcome::Minted(_))
        ));
        assert!(collection.owned().contains("42"));
    }
}
