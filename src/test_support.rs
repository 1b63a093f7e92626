//! In-memory collaborators shared by the unit tests.

use crate::chain::{
	ChainLog, ChainRpc, CallRequest, LogFilter, RpcError, SignerError, TransactionReceipt,
	TransactionSigner, UnsignedTransaction,
};
use crate::relayer::{JobState, JobStatus, RelayerApi, RelayerError, RelayerInfo, RelayerTxRequest};
use crate::transaction::codec::{
	MemoMetadata, PrivateTxRecord, TRANSACT_SELECTOR, TxType, Word, compose_memo, encode,
	word_from_u64,
};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::ledger::{
	Classification, DecryptOutcome, IndexedNote, Ledger, LedgerError, SlotNote,
};
use crate::wallet::sync::strategies::{EventScanner, ScanBatch, ScannedPayload};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

type ErrorFactory = Box<dyn Fn() -> RpcError + Send + Sync>;

pub fn sample_record(tx_type: TxType) -> PrivateTxRecord {
	let metadata = match tx_type {
		TxType::Withdraw => MemoMetadata::Withdraw {
			fee: 1,
			recipient: [0x22; 20],
		},
		TxType::Deposit | TxType::Transfer => MemoMetadata::Fee { fee: 1 },
	};
	record_with_ciphertext(tx_type, metadata, b"ciphertext")
}

fn record_with_ciphertext(
	tx_type: TxType,
	metadata: MemoMetadata,
	ciphertext: &[u8],
) -> PrivateTxRecord {
	PrivateTxRecord {
		selector: TRANSACT_SELECTOR,
		nullifier: word_from_u64(1),
		out_commit: word_from_u64(2),
		transfer_index: 3,
		energy_amount: 0,
		token_amount: 100,
		transact_proof: [[0u8; 32]; 8],
		root_after: word_from_u64(4),
		tree_proof: [[0u8; 32]; 8],
		tx_type,
		memo: compose_memo(tx_type, &metadata, ciphertext).unwrap(),
	}
}

fn tagged_payload(position: u64, ciphertext: String) -> ScannedPayload {
	let record = record_with_ciphertext(
		TxType::Transfer,
		MemoMetadata::Fee { fee: 0 },
		ciphertext.as_bytes(),
	);
	ScannedPayload {
		position,
		payload: encode(&record).unwrap(),
	}
}

/// A record that classifies as foreign.
pub fn plain_payload(position: u64, tag: &str) -> ScannedPayload {
	tagged_payload(position, format!("plain|{}|", tag))
}

/// A record whose listed output slots decrypt as notes.
pub fn notes_payload(position: u64, tag: &str, slots: &[u64]) -> ScannedPayload {
	let slots: Vec<String> = slots.iter().map(|s| s.to_string()).collect();
	tagged_payload(position, format!("notes|{}|{}", tag, slots.join(",")))
}

/// A record authored by the account.
pub fn account_payload(position: u64, tag: &str) -> ScannedPayload {
	tagged_payload(position, format!("account|{}|", tag))
}

/// Overrides what a tagged ciphertext classifies as.
#[derive(Debug, Clone)]
pub enum TestOutcome {
	AccountAndNotes(usize),
	DecryptFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
	Account { index: u64, note_indices: Vec<u64> },
	Notes { index: u64, note_indices: Vec<u64> },
	Hashes { index: u64 },
}

#[derive(Default)]
struct LedgerState {
	committed: u64,
	entries: BTreeMap<u64, LedgerCall>,
	calls: Vec<LedgerCall>,
	scripts: HashMap<String, TestOutcome>,
	fail_at: Option<u64>,
	balance: String,
}

/// Ledger keyed by leaf index, so replays overwrite rather than duplicate.
pub struct FakeLedger {
	state: Mutex<LedgerState>,
}

impl FakeLedger {
	pub fn new(next_index: u64) -> Self {
		Self {
			state: Mutex::new(LedgerState {
				committed: next_index,
				balance: "0".to_string(),
				..LedgerState::default()
			}),
		}
	}

	pub fn script(&self, tag: &str, outcome: TestOutcome) {
		self.state.lock().unwrap().scripts.insert(tag.to_string(), outcome);
	}

	/// The next write at `index` fails with a storage error.
	pub fn fail_next_add_at(&self, index: u64) {
		self.state.lock().unwrap().fail_at = Some(index);
	}

	pub fn set_balance(&self, balance: &str) {
		self.state.lock().unwrap().balance = balance.to_string();
	}

	pub fn calls(&self) -> Vec<LedgerCall> {
		self.state.lock().unwrap().calls.clone()
	}

	pub fn stored_indices(&self) -> Vec<u64> {
		self.state.lock().unwrap().entries.keys().copied().collect()
	}

	pub fn snapshot(&self) -> (BTreeMap<u64, LedgerCall>, u64) {
		let state = self.state.lock().unwrap();
		(state.entries.clone(), state.committed)
	}

	fn write(&self, index: u64, call: LedgerCall) -> Result<(), LedgerError> {
		let mut state = self.state.lock().unwrap();
		if state.fail_at == Some(index) {
			state.fail_at = None;
			return Err(LedgerError::Storage(format!("write at {} failed", index)));
		}
		state.calls.push(call.clone());
		state.entries.insert(index, call);
		Ok(())
	}
}

fn tag_word(tag: &str) -> Word {
	let mut word = [0u8; 32];
	let bytes = tag.as_bytes();
	let len = bytes.len().min(32);
	word[..len].copy_from_slice(&bytes[..len]);
	word
}

#[async_trait::async_trait]
impl Ledger for FakeLedger {
	type Account = String;
	type Note = String;

	async fn classify(
		&self,
		ciphertext: &[u8],
	) -> Result<Classification<String, String>, LedgerError> {
		let text = String::from_utf8_lossy(ciphertext).into_owned();
		let mut parts = text.splitn(3, '|');
		let kind = parts.next().unwrap_or_default();
		let tag = parts.next().unwrap_or_default();
		let slots = parts.next().unwrap_or_default();
		let hashes = vec![tag_word(tag)];

		let script = self.state.lock().unwrap().scripts.get(tag).cloned();
		let outcome = match (script, kind) {
			(Some(TestOutcome::DecryptFailure), _) => {
				return Err(LedgerError::Decrypt(format!("cannot decrypt {}", tag)));
			}
			(Some(TestOutcome::AccountAndNotes(count)), _) => DecryptOutcome::Account {
				account: tag.to_string(),
				notes: (0..count).map(|i| format!("{}-{}", tag, i)).collect(),
			},
			(None, "account") => DecryptOutcome::Account {
				account: tag.to_string(),
				notes: Vec::new(),
			},
			(None, "notes") => DecryptOutcome::NotesOnly(
				slots
					.split(',')
					.filter(|s| !s.is_empty())
					.map(|s| {
						let slot: u64 = s.parse().unwrap();
						SlotNote {
							slot,
							note: format!("{}-{}", tag, slot),
						}
					})
					.collect(),
			),
			(None, "plain") => DecryptOutcome::None,
			(None, other) => return Err(LedgerError::Decrypt(format!("unknown kind {}", other))),
		};

		Ok(Classification { hashes, outcome })
	}

	async fn add_account(
		&self,
		index: u64,
		_hashes: &[Word],
		_account: String,
		notes: Vec<IndexedNote<String>>,
	) -> Result<(), LedgerError> {
		let note_indices = notes.iter().map(|n| n.index).collect();
		self.write(index, LedgerCall::Account { index, note_indices })
	}

	async fn add_notes(
		&self,
		index: u64,
		_hashes: &[Word],
		notes: Vec<IndexedNote<String>>,
	) -> Result<(), LedgerError> {
		let note_indices = notes.iter().map(|n| n.index).collect();
		self.write(index, LedgerCall::Notes { index, note_indices })
	}

	async fn add_hashes(&self, index: u64, _hashes: &[Word]) -> Result<(), LedgerError> {
		self.write(index, LedgerCall::Hashes { index })
	}

	async fn next_tree_index(&self) -> Result<u64, LedgerError> {
		Ok(self.state.lock().unwrap().committed)
	}

	async fn commit_tree_index(&self, next_index: u64) -> Result<(), LedgerError> {
		let mut state = self.state.lock().unwrap();
		state.committed = state.committed.max(next_index);
		Ok(())
	}

	async fn total_balance(&self) -> Result<String, LedgerError> {
		Ok(self.state.lock().unwrap().balance.clone())
	}
}

/// Scanner over a fixed list of payloads, honouring the checkpoint like a real source.
pub struct ScriptedScanner {
	payloads: Vec<ScannedPayload>,
	next_checkpoint: Option<u64>,
	delay: Duration,
	fail: bool,
}

impl ScriptedScanner {
	pub fn new(payloads: Vec<ScannedPayload>) -> Self {
		Self {
			payloads,
			next_checkpoint: None,
			delay: Duration::ZERO,
			fail: false,
		}
	}

	pub fn failing() -> Self {
		Self {
			fail: true,
			..Self::new(Vec::new())
		}
	}

	pub fn with_next_checkpoint(mut self, checkpoint: u64) -> Self {
		self.next_checkpoint = Some(checkpoint);
		self
	}

	pub fn with_delay_ms(mut self, millis: u64) -> Self {
		self.delay = Duration::from_millis(millis);
		self
	}
}

#[async_trait::async_trait]
impl EventScanner for ScriptedScanner {
	async fn fetch(&self, checkpoint: u64) -> Result<ScanBatch, WalletSyncError> {
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		if self.fail {
			return Err(RpcError::Unavailable("scripted outage".to_string()).into());
		}
		let payloads: Vec<ScannedPayload> = self
			.payloads
			.iter()
			.filter(|p| p.position > checkpoint)
			.cloned()
			.collect();
		let next_checkpoint = self.next_checkpoint.unwrap_or_else(|| {
			payloads
				.iter()
				.map(|p| p.position)
				.max()
				.unwrap_or(checkpoint)
		});
		Ok(ScanBatch {
			payloads,
			next_checkpoint,
		})
	}

	fn name(&self) -> &'static str {
		"ScriptedScanner"
	}
}

#[derive(Default)]
struct ChainState {
	head: u64,
	logs: Vec<(ChainLog, String)>,
	log_queries: Vec<LogFilter>,
	block_number_failures: u32,
	block_number_error: Option<ErrorFactory>,
	gas_estimate: u64,
	receipt_delay: u32,
	receipt_polls: HashMap<String, u32>,
	receipt_failure: bool,
	broadcast_error: Option<ErrorFactory>,
	broadcast_attempts: usize,
	sent: Vec<(String, String)>,
	allowances: HashMap<(String, String, String), u128>,
}

/// Single-account chain. Raw transactions are the `from|to|data` strings produced by
/// [`FakeSigner`]; `increaseAllowance` calls are applied when broadcast.
pub struct FakeChain {
	state: Mutex<ChainState>,
}

fn allowance_key(token: &str, owner: &str, spender: &str) -> (String, String, String) {
	(
		token.to_lowercase(),
		owner.to_lowercase(),
		spender.to_lowercase(),
	)
}

impl FakeChain {
	pub fn new() -> Self {
		Self {
			state: Mutex::new(ChainState {
				gas_estimate: 21_000,
				..ChainState::default()
			}),
		}
	}

	pub fn set_head(&self, head: u64) {
		self.state.lock().unwrap().head = head;
	}

	pub fn add_log(&self, log: ChainLog, input: &str) {
		self.state.lock().unwrap().logs.push((log, input.to_string()));
	}

	pub fn log_queries(&self) -> Vec<LogFilter> {
		self.state.lock().unwrap().log_queries.clone()
	}

	/// The next `times` block number calls fail with `error()`.
	pub fn fail_block_number(&self, times: u32, error: impl Fn() -> RpcError + Send + Sync + 'static) {
		let mut state = self.state.lock().unwrap();
		state.block_number_failures = times;
		state.block_number_error = Some(Box::new(error));
	}

	pub fn set_gas_estimate(&self, gas: u64) {
		self.state.lock().unwrap().gas_estimate = gas;
	}

	/// Receipts stay unavailable for the first `polls` lookups of each hash.
	pub fn set_receipt_delay(&self, polls: u32) {
		self.state.lock().unwrap().receipt_delay = polls;
	}

	pub fn set_receipt_success(&self, success: bool) {
		self.state.lock().unwrap().receipt_failure = !success;
	}

	pub fn fail_broadcast(&self, error: impl Fn() -> RpcError + Send + Sync + 'static) {
		self.state.lock().unwrap().broadcast_error = Some(Box::new(error));
	}

	pub fn broadcast_attempts(&self) -> usize {
		self.state.lock().unwrap().broadcast_attempts
	}

	/// `(raw, hash)` of every accepted broadcast.
	pub fn sent(&self) -> Vec<(String, String)> {
		self.state.lock().unwrap().sent.clone()
	}

	pub fn set_allowance(&self, token: &str, owner: &str, spender: &str, amount: u128) {
		self.state
			.lock()
			.unwrap()
			.allowances
			.insert(allowance_key(token, owner, spender), amount);
	}

	pub fn allowance_of(&self, token: &str, owner: &str, spender: &str) -> u128 {
		self.state
			.lock()
			.unwrap()
			.allowances
			.get(&allowance_key(token, owner, spender))
			.copied()
			.unwrap_or(0)
	}
}

#[async_trait::async_trait]
impl ChainRpc for FakeChain {
	async fn chain_id(&self) -> Result<u64, RpcError> {
		Ok(31337)
	}

	async fn block_number(&self) -> Result<u64, RpcError> {
		let mut state = self.state.lock().unwrap();
		if state.block_number_failures > 0 {
			state.block_number_failures -= 1;
			if let Some(error) = &state.block_number_error {
				return Err(error());
			}
		}
		Ok(state.head)
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, RpcError> {
		let mut state = self.state.lock().unwrap();
		state.log_queries.push(filter.clone());
		let mut logs: Vec<ChainLog> = state
			.logs
			.iter()
			.map(|(log, _)| log.clone())
			.filter(|log| log.block_number >= filter.from_block && log.block_number <= filter.to_block)
			.collect();
		logs.sort_by_key(|log| (log.block_number, log.log_index));
		Ok(logs)
	}

	async fn transaction_input(&self, tx_hash: &str) -> Result<String, RpcError> {
		let state = self.state.lock().unwrap();
		state
			.logs
			.iter()
			.find(|(log, _)| log.transaction_hash == tx_hash)
			.map(|(_, input)| input.clone())
			.ok_or_else(|| RpcError::InvalidResponse(format!("unknown transaction {}", tx_hash)))
	}

	async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64, RpcError> {
		Ok(self.state.lock().unwrap().gas_estimate)
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		Ok(1_000_000_000)
	}

	async fn nonce(&self, _address: &str) -> Result<u64, RpcError> {
		Ok(self.state.lock().unwrap().sent.len() as u64)
	}

	async fn allowance(&self, token: &str, owner: &str, spender: &str) -> Result<u128, RpcError> {
		Ok(self.allowance_of(token, owner, spender))
	}

	async fn send_raw_transaction(&self, raw_tx: &str) -> Result<String, RpcError> {
		let mut state = self.state.lock().unwrap();
		state.broadcast_attempts += 1;
		if let Some(error) = &state.broadcast_error {
			return Err(error());
		}

		let mut parts = raw_tx.splitn(3, '|');
		let from = parts.next().unwrap_or_default();
		let to = parts.next().unwrap_or_default();
		let data = parts.next().unwrap_or_default();
		// increaseAllowance(address spender, uint256 delta)
		if let Some(args) = data.strip_prefix("0x39509351") {
			let spender = format!("0x{}", &args[24..64]);
			let delta = u128::from_str_radix(&args[64..128], 16).unwrap();
			*state
				.allowances
				.entry(allowance_key(to, from, &spender))
				.or_default() += delta;
		}

		let hash = format!("0x{:064x}", state.sent.len() + 1);
		state.sent.push((raw_tx.to_string(), hash.clone()));
		Ok(hash)
	}

	async fn transaction_receipt(
		&self,
		tx_hash: &str,
	) -> Result<Option<TransactionReceipt>, RpcError> {
		let mut state = self.state.lock().unwrap();
		let delay = state.receipt_delay;
		let success = !state.receipt_failure;
		let polls = state.receipt_polls.entry(tx_hash.to_string()).or_default();
		if *polls < delay {
			*polls += 1;
			return Ok(None);
		}
		Ok(Some(TransactionReceipt {
			transaction_hash: tx_hash.to_string(),
			block_number: 100,
			success,
		}))
	}
}

/// Signer that records what it signs.
pub struct FakeSigner {
	address: String,
	signed: Mutex<Vec<UnsignedTransaction>>,
}

impl FakeSigner {
	pub fn new(address: &str) -> Self {
		Self {
			address: address.to_string(),
			signed: Mutex::new(Vec::new()),
		}
	}

	pub fn signed(&self) -> Vec<UnsignedTransaction> {
		self.signed.lock().unwrap().clone()
	}
}

impl TransactionSigner for FakeSigner {
	fn address(&self) -> &str {
		&self.address
	}

	fn sign(&self, tx: &UnsignedTransaction) -> Result<String, SignerError> {
		self.signed.lock().unwrap().push(tx.clone());
		Ok(format!("{}|{}|{}", self.address, tx.to, tx.data))
	}
}

#[derive(Default)]
struct RelayerState {
	log: Vec<String>,
	page_requests: Vec<(u64, u64)>,
	delta_index: u64,
	job_statuses: VecDeque<Option<JobStatus>>,
	job_polls: usize,
	submitted: Vec<RelayerTxRequest>,
	without_job: bool,
}

/// Relayer whose jobs stay queued unless statuses are pushed.
pub struct FakeRelayer {
	state: Mutex<RelayerState>,
}

impl FakeRelayer {
	pub fn with_log(log: Vec<String>) -> Self {
		Self {
			state: Mutex::new(RelayerState {
				log,
				..RelayerState::default()
			}),
		}
	}

	pub fn page_requests(&self) -> Vec<(u64, u64)> {
		self.state.lock().unwrap().page_requests.clone()
	}

	pub fn set_delta_index(&self, delta_index: u64) {
		self.state.lock().unwrap().delta_index = delta_index;
	}

	pub fn push_job_statuses(&self, statuses: Vec<Option<JobStatus>>) {
		self.state.lock().unwrap().job_statuses.extend(statuses);
	}

	pub fn job_polls(&self) -> usize {
		self.state.lock().unwrap().job_polls
	}

	pub fn submitted(&self) -> Vec<RelayerTxRequest> {
		self.state.lock().unwrap().submitted.clone()
	}

	/// Accept submissions with an empty response body.
	pub fn accept_without_job(&self) {
		self.state.lock().unwrap().without_job = true;
	}

	pub fn last_job_id(&self) -> String {
		format!("job-{}", self.state.lock().unwrap().submitted.len())
	}
}

#[async_trait::async_trait]
impl RelayerApi for FakeRelayer {
	async fn fetch_transactions(&self, offset: u64, limit: u64) -> Result<Vec<String>, RelayerError> {
		let mut state = self.state.lock().unwrap();
		state.page_requests.push((offset, limit));
		let start = (offset as usize).min(state.log.len());
		let end = (offset.saturating_add(limit) as usize).min(state.log.len());
		Ok(state.log[start..end].to_vec())
	}

	async fn submit_transaction(
		&self,
		request: &RelayerTxRequest,
	) -> Result<Option<String>, RelayerError> {
		let mut state = self.state.lock().unwrap();
		state.submitted.push(request.clone());
		if state.without_job {
			return Ok(None);
		}
		Ok(Some(format!("job-{}", state.submitted.len())))
	}

	async fn job_status(&self, _job_id: &str) -> Result<Option<JobStatus>, RelayerError> {
		let mut state = self.state.lock().unwrap();
		state.job_polls += 1;
		Ok(state.job_statuses.pop_front().unwrap_or_else(|| {
			Some(JobStatus {
				state: JobState::Queued,
				tx_hash: None,
				failed_reason: None,
			})
		}))
	}

	async fn info(&self) -> Result<RelayerInfo, RelayerError> {
		Ok(RelayerInfo {
			root: "0x00".to_string(),
			delta_index: self.state.lock().unwrap().delta_index,
		})
	}
}
