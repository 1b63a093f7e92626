use crate::transaction::codec::{self, PrivateTxRecord, TRANSACT_SELECTOR, TxType, WithdrawDetails};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::strategies::ScannedPayload;
use tracing::{debug, warn};

/// A scanned payload decoded into the parts a sync pass needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
	pub position: u64,
	pub record: PrivateTxRecord,
	/// Memo without its metadata prefix.
	pub ciphertext: Vec<u8>,
	/// Present for withdrawals.
	pub withdraw: Option<WithdrawDetails>,
}

#[derive(Clone, Default)]
pub struct TransactionProcessor;

impl TransactionProcessor {
	pub fn new() -> Self {
		Self
	}

	/// Parse a raw hex payload into a record
	pub fn parse_transaction(&self, raw_hex: &str) -> Result<PrivateTxRecord, WalletSyncError> {
		let record = codec::decode(raw_hex)?;
		if record.selector != TRANSACT_SELECTOR {
			debug!(
				"Record carries selector {} instead of transact()",
				hex::encode(record.selector)
			);
		}
		Ok(record)
	}

	/// Decode a scanned payload and split out its ciphertext
	pub fn process_transaction(
		&self,
		payload: &ScannedPayload,
	) -> Result<ProcessedRecord, WalletSyncError> {
		let record = self.parse_transaction(&payload.payload)?;
		let ciphertext = record.ciphertext()?.to_vec();
		let withdraw = match record.tx_type {
			TxType::Withdraw => Some(WithdrawDetails::from_record(&record)?),
			TxType::Deposit | TxType::Transfer => None,
		};

		Ok(ProcessedRecord {
			position: payload.position,
			record,
			ciphertext,
			withdraw,
		})
	}

	/// Batch process payloads, dropping the ones that fail to decode
	pub fn process_transactions_batch(&self, payloads: &[ScannedPayload]) -> (Vec<ProcessedRecord>, usize) {
		let mut processed = Vec::with_capacity(payloads.len());
		let mut skipped = 0;

		for payload in payloads {
			match self.process_transaction(payload) {
				Ok(record) => processed.push(record),
				Err(e) => {
					warn!("Skipping payload at position {}: {}", payload.position, e);
					skipped += 1;
				}
			}
		}

		(processed, skipped)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transaction::codec::{MemoMetadata, compose_memo, encode, word_from_u64};

	fn payload(position: u64, tx_type: TxType, metadata: MemoMetadata) -> ScannedPayload {
		let record = PrivateTxRecord {
			selector: TRANSACT_SELECTOR,
			nullifier: word_from_u64(position),
			out_commit: word_from_u64(position + 1),
			transfer_index: position,
			energy_amount: 0,
			token_amount: WithdrawDetails::token_amount_slot(70).unwrap(),
			transact_proof: [[1u8; 32]; 8],
			root_after: word_from_u64(9),
			tree_proof: [[2u8; 32]; 8],
			tx_type,
			memo: compose_memo(tx_type, &metadata, &[0xc0, 0xff, 0xee]).unwrap(),
		};
		ScannedPayload {
			position,
			payload: encode(&record).unwrap(),
		}
	}

	#[test]
	fn test_process_withdraw() {
		let processor = TransactionProcessor::new();
		let scanned = payload(
			4,
			TxType::Withdraw,
			MemoMetadata::Withdraw {
				fee: 3,
				recipient: [0x42; 20],
			},
		);

		let processed = processor.process_transaction(&scanned).unwrap();
		assert_eq!(processed.position, 4);
		assert_eq!(processed.ciphertext, vec![0xc0, 0xff, 0xee]);
		let withdraw = processed.withdraw.unwrap();
		assert_eq!(withdraw.amount, -70);
		assert_eq!(withdraw.recipient, [0x42; 20]);
	}

	#[test]
	fn test_batch_skips_corrupt_payloads() {
		let processor = TransactionProcessor::new();
		let batch = vec![
			payload(0, TxType::Deposit, MemoMetadata::Fee { fee: 1 }),
			ScannedPayload {
				position: 1,
				payload: "0xdeadbeef".to_string(),
			},
			payload(2, TxType::Transfer, MemoMetadata::Fee { fee: 1 }),
		];

		let (processed, skipped) = processor.process_transactions_batch(&batch);
		assert_eq!(skipped, 1);
		assert_eq!(
			processed.iter().map(|p| p.position).collect::<Vec<_>>(),
			vec![0, 2]
		);
	}
}
