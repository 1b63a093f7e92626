//!
//! Wire codec for the pool contract's `transact()` calldata.
//!
//! The record is a fixed-layout byte string: a 4-byte selector followed by the public inputs
//! and proofs, the transaction type, and a length-prefixed memo. Every integer on the outer
//! record is unsigned big-endian. The only signed value in the layout is the withdrawal delta,
//! which travels as the two's-complement image of a negative amount inside the `tokenAmount`
//! slot and is read back through [`WithdrawDetails`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker prepended to every encoded record.
pub const WIRE_PREFIX: &str = "0x";

/// Selector of `transact()` on the pool contract.
pub const TRANSACT_SELECTOR: [u8; SELECTOR_LEN] = [0xaf, 0x98, 0x90, 0x83];

pub const SELECTOR_LEN: usize = 4;
pub const WORD_LEN: usize = 32;
pub const TRANSFER_INDEX_LEN: usize = 6;
pub const AMOUNT_LEN: usize = 8;
pub const PROOF_WORDS: usize = 8;
pub const TX_TYPE_LEN: usize = 1;
pub const MEMO_LEN_LEN: usize = 2;

/// Width of everything before the memo bytes (637).
pub const HEADER_LEN: usize = SELECTOR_LEN
	+ WORD_LEN
	+ WORD_LEN
	+ TRANSFER_INDEX_LEN
	+ AMOUNT_LEN
	+ AMOUNT_LEN
	+ PROOF_WORDS * WORD_LEN
	+ WORD_LEN
	+ PROOF_WORDS * WORD_LEN
	+ TX_TYPE_LEN
	+ MEMO_LEN_LEN;

/// Largest value representable in the 6-byte transfer index.
pub const MAX_TRANSFER_INDEX: u64 = (1 << (TRANSFER_INDEX_LEN * 8)) - 1;

/// Length of an EVM address embedded in withdraw memos.
pub const ADDRESS_LEN: usize = 20;
/// Memo metadata for deposits and transfers: the relayer fee.
pub const FEE_PREFIX_LEN: usize = AMOUNT_LEN;
/// Memo metadata for withdrawals: the relayer fee and the recipient address.
pub const WITHDRAW_PREFIX_LEN: usize = AMOUNT_LEN + ADDRESS_LEN;

pub type Word = [u8; WORD_LEN];
pub type ProofWords = [Word; PROOF_WORDS];
pub type Address = [u8; ADDRESS_LEN];

/// Errors raised while encoding or decoding a record. Never retried.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
	#[error("Invalid hex payload: {0}")]
	InvalidHex(#[from] hex::FromHexError),

	#[error("Payload truncated: need {needed} bytes, {available} available")]
	Truncated { needed: usize, available: usize },

	#[error("Unknown transaction type byte: 0x{0:02x}")]
	UnknownTxType(u8),

	#[error("{0} trailing bytes after the declared memo")]
	TrailingBytes(usize),

	#[error("Field {field} value {value} does not fit in {width} bytes")]
	FieldOverflow {
		field: &'static str,
		value: u64,
		width: usize,
	},

	#[error("Memo of {0} bytes exceeds the 2-byte length field")]
	MemoTooLong(usize),

	#[error("Memo of {len} bytes is shorter than the {expected}-byte {tx_type:?} metadata prefix")]
	MemoTooShort {
		tx_type: TxType,
		len: usize,
		expected: usize,
	},

	#[error("Memo metadata does not match transaction type {0:?}")]
	MetadataMismatch(TxType),
}

/// Transaction type byte of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
	Deposit = 0x00,
	Transfer = 0x01,
	Withdraw = 0x02,
}

impl TxType {
	pub fn as_byte(self) -> u8 {
		self as u8
	}

	/// Width of the metadata prefix that precedes the ciphertext in the memo.
	pub fn memo_prefix_len(self) -> usize {
		match self {
			TxType::Deposit | TxType::Transfer => FEE_PREFIX_LEN,
			TxType::Withdraw => WITHDRAW_PREFIX_LEN,
		}
	}

	/// Four-digit code the relayer expects in the `txType` field.
	pub fn relayer_code(self) -> &'static str {
		match self {
			TxType::Deposit => "0000",
			TxType::Transfer => "0001",
			TxType::Withdraw => "0002",
		}
	}
}

impl TryFrom<u8> for TxType {
	type Error = CodecError;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0x00 => Ok(TxType::Deposit),
			0x01 => Ok(TxType::Transfer),
			0x02 => Ok(TxType::Withdraw),
			other => Err(CodecError::UnknownTxType(other)),
		}
	}
}

/// Decoded `transact()` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateTxRecord {
	pub selector: [u8; SELECTOR_LEN],
	pub nullifier: Word,
	pub out_commit: Word,
	/// 48-bit on the wire.
	pub transfer_index: u64,
	pub energy_amount: u64,
	pub token_amount: u64,
	pub transact_proof: ProofWords,
	pub root_after: Word,
	pub tree_proof: ProofWords,
	pub tx_type: TxType,
	pub memo: Vec<u8>,
}

impl PrivateTxRecord {
	/// Number of bytes this record occupies on the wire.
	pub fn encoded_len(&self) -> usize {
		HEADER_LEN + self.memo.len()
	}

	/// Memo with the type-dependent metadata prefix removed.
	pub fn ciphertext(&self) -> Result<&[u8], CodecError> {
		ciphertext(self)
	}
}

/// Builds a 32-byte big-endian word holding `value`.
pub fn word_from_u64(value: u64) -> Word {
	let mut word = [0u8; WORD_LEN];
	word[WORD_LEN - AMOUNT_LEN..].copy_from_slice(&value.to_be_bytes());
	word
}

/// Appends `value` as an unsigned big-endian integer of exactly `width` bytes.
pub fn write_unsigned_be(
	out: &mut Vec<u8>,
	field: &'static str,
	value: u64,
	width: usize,
) -> Result<(), CodecError> {
	if width < AMOUNT_LEN && value >> (width * 8) != 0 {
		return Err(CodecError::FieldOverflow {
			field,
			value,
			width,
		});
	}
	let bytes = value.to_be_bytes();
	out.extend_from_slice(&bytes[AMOUNT_LEN - width..]);
	Ok(())
}

/// Reads an unsigned big-endian integer of up to 8 bytes.
pub fn read_unsigned_be(bytes: &[u8]) -> u64 {
	bytes
		.iter()
		.fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// Two's-complement image of a signed 64-bit amount.
pub fn encode_twos_complement_i64(value: i64) -> [u8; AMOUNT_LEN] {
	value.to_be_bytes()
}

/// Reads a two's-complement signed 64-bit amount.
pub fn decode_twos_complement_i64(bytes: [u8; AMOUNT_LEN]) -> i64 {
	i64::from_be_bytes(bytes)
}

/// Encodes a record into its `0x`-prefixed hex wire form.
pub fn encode(record: &PrivateTxRecord) -> Result<String, CodecError> {
	let memo_len = u16::try_from(record.memo.len())
		.map_err(|_| CodecError::MemoTooLong(record.memo.len()))?;

	let mut out = Vec::with_capacity(record.encoded_len());
	out.extend_from_slice(&record.selector);
	out.extend_from_slice(&record.nullifier);
	out.extend_from_slice(&record.out_commit);
	write_unsigned_be(
		&mut out,
		"transferIndex",
		record.transfer_index,
		TRANSFER_INDEX_LEN,
	)?;
	write_unsigned_be(&mut out, "energyAmount", record.energy_amount, AMOUNT_LEN)?;
	write_unsigned_be(&mut out, "tokenAmount", record.token_amount, AMOUNT_LEN)?;
	for word in &record.transact_proof {
		out.extend_from_slice(word);
	}
	out.extend_from_slice(&record.root_after);
	for word in &record.tree_proof {
		out.extend_from_slice(word);
	}
	out.push(record.tx_type.as_byte());
	out.extend_from_slice(&memo_len.to_be_bytes());
	out.extend_from_slice(&record.memo);

	Ok(format!("{}{}", WIRE_PREFIX, hex::encode(out)))
}

/// Decodes a hex wire string (with or without the `0x` marker).
///
/// Rejects short buffers, unknown transaction types and any bytes left over after the
/// declared memo.
pub fn decode(wire: &str) -> Result<PrivateTxRecord, CodecError> {
	let hex_body = wire.strip_prefix(WIRE_PREFIX).unwrap_or(wire);
	let bytes = hex::decode(hex_body)?;

	if bytes.len() < HEADER_LEN {
		return Err(CodecError::Truncated {
			needed: HEADER_LEN,
			available: bytes.len(),
		});
	}

	let mut cursor = WireCursor::new(&bytes);
	let selector = cursor.array::<SELECTOR_LEN>()?;
	let nullifier = cursor.array::<WORD_LEN>()?;
	let out_commit = cursor.array::<WORD_LEN>()?;
	let transfer_index = cursor.unsigned(TRANSFER_INDEX_LEN)?;
	let energy_amount = cursor.unsigned(AMOUNT_LEN)?;
	let token_amount = cursor.unsigned(AMOUNT_LEN)?;
	let transact_proof = cursor.proof()?;
	let root_after = cursor.array::<WORD_LEN>()?;
	let tree_proof = cursor.proof()?;
	let tx_type = TxType::try_from(cursor.take(TX_TYPE_LEN)?[0])?;
	let memo_len = cursor.unsigned(MEMO_LEN_LEN)? as usize;
	let memo = cursor.take(memo_len)?.to_vec();

	let remaining = cursor.remaining();
	if remaining != 0 {
		return Err(CodecError::TrailingBytes(remaining));
	}

	Ok(PrivateTxRecord {
		selector,
		nullifier,
		out_commit,
		transfer_index,
		energy_amount,
		token_amount,
		transact_proof,
		root_after,
		tree_proof,
		tx_type,
		memo,
	})
}

/// Returns the memo with its metadata prefix stripped.
pub fn ciphertext(record: &PrivateTxRecord) -> Result<&[u8], CodecError> {
	let prefix = record.tx_type.memo_prefix_len();
	record
		.memo
		.get(prefix..)
		.ok_or(CodecError::MemoTooShort {
			tx_type: record.tx_type,
			len: record.memo.len(),
			expected: prefix,
		})
}

/// Metadata carried in front of the memo ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoMetadata {
	/// Deposits and transfers.
	Fee { fee: u64 },
	/// Withdrawals.
	Withdraw { fee: u64, recipient: Address },
}

impl MemoMetadata {
	pub fn fee(&self) -> u64 {
		match self {
			MemoMetadata::Fee { fee } | MemoMetadata::Withdraw { fee, .. } => *fee,
		}
	}

	fn matches(&self, tx_type: TxType) -> bool {
		matches!(
			(self, tx_type),
			(MemoMetadata::Fee { .. }, TxType::Deposit | TxType::Transfer)
				| (MemoMetadata::Withdraw { .. }, TxType::Withdraw)
		)
	}

	/// Parses the metadata prefix of `memo` for the given transaction type.
	pub fn parse(tx_type: TxType, memo: &[u8]) -> Result<Self, CodecError> {
		let expected = tx_type.memo_prefix_len();
		if memo.len() < expected {
			return Err(CodecError::MemoTooShort {
				tx_type,
				len: memo.len(),
				expected,
			});
		}
		let fee = read_unsigned_be(&memo[..FEE_PREFIX_LEN]);
		match tx_type {
			TxType::Deposit | TxType::Transfer => Ok(MemoMetadata::Fee { fee }),
			TxType::Withdraw => {
				let mut recipient = [0u8; ADDRESS_LEN];
				recipient.copy_from_slice(&memo[FEE_PREFIX_LEN..WITHDRAW_PREFIX_LEN]);
				Ok(MemoMetadata::Withdraw { fee, recipient })
			}
		}
	}
}

/// Joins metadata and ciphertext into a memo for `tx_type`.
pub fn compose_memo(
	tx_type: TxType,
	metadata: &MemoMetadata,
	ciphertext: &[u8],
) -> Result<Vec<u8>, CodecError> {
	if !metadata.matches(tx_type) {
		return Err(CodecError::MetadataMismatch(tx_type));
	}
	let mut memo = Vec::with_capacity(tx_type.memo_prefix_len() + ciphertext.len());
	write_unsigned_be(&mut memo, "fee", metadata.fee(), AMOUNT_LEN)?;
	if let MemoMetadata::Withdraw { recipient, .. } = metadata {
		memo.extend_from_slice(recipient);
	}
	memo.extend_from_slice(ciphertext);
	if memo.len() > u16::MAX as usize {
		return Err(CodecError::MemoTooLong(memo.len()));
	}
	Ok(memo)
}

/// Sub-fields of a withdrawal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawDetails {
	pub fee: u64,
	pub recipient: Address,
	/// Pool delta; negative for funds leaving the pool.
	pub amount: i64,
}

impl WithdrawDetails {
	pub fn from_record(record: &PrivateTxRecord) -> Result<Self, CodecError> {
		if record.tx_type != TxType::Withdraw {
			return Err(CodecError::MetadataMismatch(record.tx_type));
		}
		match MemoMetadata::parse(TxType::Withdraw, &record.memo)? {
			MemoMetadata::Withdraw { fee, recipient } => Ok(Self {
				fee,
				recipient,
				amount: decode_twos_complement_i64(record.token_amount.to_be_bytes()),
			}),
			MemoMetadata::Fee { .. } => Err(CodecError::MetadataMismatch(TxType::Withdraw)),
		}
	}

	/// Value for the `tokenAmount` slot of a withdrawal of `amount` base units.
	pub fn token_amount_slot(amount: u64) -> Result<u64, CodecError> {
		let signed = i64::try_from(amount).map_err(|_| CodecError::FieldOverflow {
			field: "withdrawAmount",
			value: amount,
			width: AMOUNT_LEN,
		})?;
		Ok(u64::from_be_bytes(encode_twos_complement_i64(-signed)))
	}
}

struct WireCursor<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> WireCursor<'a> {
	fn new(bytes: &'a [u8]) -> Self {
		Self { bytes, pos: 0 }
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
		let end = self.pos + len;
		if end > self.bytes.len() {
			return Err(CodecError::Truncated {
				needed: end,
				available: self.bytes.len(),
			});
		}
		let slice = &self.bytes[self.pos..end];
		self.pos = end;
		Ok(slice)
	}

	fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
		let mut out = [0u8; N];
		out.copy_from_slice(self.take(N)?);
		Ok(out)
	}

	fn unsigned(&mut self, width: usize) -> Result<u64, CodecError> {
		Ok(read_unsigned_be(self.take(width)?))
	}

	fn proof(&mut self) -> Result<ProofWords, CodecError> {
		let mut words = [[0u8; WORD_LEN]; PROOF_WORDS];
		for word in words.iter_mut() {
			*word = self.array::<WORD_LEN>()?;
		}
		Ok(words)
	}

	fn remaining(&self) -> usize {
		self.bytes.len() - self.pos
	}
}
