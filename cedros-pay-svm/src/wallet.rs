//! A keypair-backed [`PaymentWallet`] paying with SPL tokens.
//!
//! The transfer is a single `TransferChecked` from the payer's associated
//! token account, preceded by compute budget instructions and followed by an
//! optional memo:
//!
//! 1. `SetComputeUnitLimit`
//! 2. `SetComputeUnitPrice`
//! 3. `TransferChecked` (SPL Token or Token-2022, whichever owns the mint)
//! 4. `Memo`, when the requirement carries one
//!
//! When the requirement names a sponsoring fee payer, the transaction is
//! compiled with that account in slot 0 and only the payer's slot is signed.

use std::fmt;

use cedros_pay::proto::PaymentRequirement;
use cedros_pay::wallet::{BoxFuture, PaymentWallet, SignedTransaction, WalletError};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_message::VersionedMessage;
use solana_message::v0::Message as MessageV0;
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;
use spl_token_2022::extension::StateWithExtensions;

use crate::error::SolanaWalletError;
use crate::rpc::SolanaRpc;
use crate::transaction::{decode_transaction, encode_transaction, sign_partial};

/// Associated Token Account program.
pub const ATA_PROGRAM_ID: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// SPL Memo program (v2).
pub const MEMO_PROGRAM_ID: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Compute units requested for a transfer with memo.
pub const DEFAULT_COMPUTE_UNIT_LIMIT: u32 = 200_000;

/// Priority fee in micro-lamports per compute unit.
pub const DEFAULT_COMPUTE_UNIT_PRICE: u64 = 1;

/// On-chain facts about a mint needed to transfer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintInfo {
    /// Token decimals.
    pub decimals: u8,
    /// Owning token program.
    pub token_program: Pubkey,
}

/// Derives the associated token account of `owner` for `mint`.
#[must_use]
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    let (address, _) = Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    );
    address
}

/// Fetches a mint and determines which token program owns it.
///
/// # Errors
///
/// Returns [`SolanaWalletError::MintNotFound`], [`SolanaWalletError::UnsupportedMint`]
/// for an account owned by another program, or an RPC or unpack error.
pub async fn fetch_mint<R: SolanaRpc + ?Sized>(
    rpc: &R,
    mint: &Pubkey,
) -> Result<MintInfo, SolanaWalletError> {
    let account = rpc
        .get_account(mint)
        .await?
        .ok_or(SolanaWalletError::MintNotFound(*mint))?;
    let unpack_error = |e: &dyn fmt::Display| SolanaWalletError::Unpack {
        account: *mint,
        reason: e.to_string(),
    };
    if account.owner == spl_token::id() {
        let state = spl_token::state::Mint::unpack(&account.data).map_err(|e| unpack_error(&e))?;
        Ok(MintInfo {
            decimals: state.decimals,
            token_program: spl_token::id(),
        })
    } else if account.owner == spl_token_2022::id() {
        let state = StateWithExtensions::<spl_token_2022::state::Mint>::unpack(&account.data)
            .map_err(|e| unpack_error(&e))?;
        Ok(MintInfo {
            decimals: state.base.decimals,
            token_program: spl_token_2022::id(),
        })
    } else {
        Err(SolanaWalletError::UnsupportedMint {
            mint: *mint,
            owner: account.owner,
        })
    }
}

/// Fetches the balance of a token account, `None` if it does not exist.
///
/// # Errors
///
/// Returns an RPC or unpack error.
pub async fn fetch_token_balance<R: SolanaRpc + ?Sized>(
    rpc: &R,
    token_account: &Pubkey,
    token_program: &Pubkey,
) -> Result<Option<u64>, SolanaWalletError> {
    let Some(account) = rpc.get_account(token_account).await? else {
        return Ok(None);
    };
    let unpack_error = |e: &dyn fmt::Display| SolanaWalletError::Unpack {
        account: *token_account,
        reason: e.to_string(),
    };
    let amount = if *token_program == spl_token_2022::id() {
        StateWithExtensions::<spl_token_2022::state::Account>::unpack(&account.data)
            .map_err(|e| unpack_error(&e))?
            .base
            .amount
    } else {
        spl_token::state::Account::unpack(&account.data)
            .map_err(|e| unpack_error(&e))?
            .amount
    };
    Ok(Some(amount))
}

fn parse_address(field: &'static str, value: &str) -> Result<Pubkey, SolanaWalletError> {
    value
        .trim()
        .parse()
        .map_err(|_| SolanaWalletError::InvalidAddress {
            field,
            value: value.to_owned(),
        })
}

fn memo_instruction(memo: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: Vec::new(),
        data: memo.as_bytes().to_vec(),
    }
}

/// A Solana wallet holding a signer and an RPC connection.
pub struct SolanaWallet<S, R = RpcClient> {
    signer: S,
    rpc: R,
    compute_unit_limit: u32,
    compute_unit_price: u64,
    check_balance: bool,
}

impl<S: Signer, R> fmt::Debug for SolanaWallet<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaWallet")
            .field("pubkey", &self.signer.pubkey())
            .field("compute_unit_limit", &self.compute_unit_limit)
            .field("compute_unit_price", &self.compute_unit_price)
            .finish_non_exhaustive()
    }
}

impl<S> SolanaWallet<S, RpcClient> {
    /// Creates a wallet talking to the RPC endpoint at `rpc_url`.
    #[must_use]
    pub fn with_rpc_url(signer: S, rpc_url: impl Into<String>) -> Self {
        Self::new(signer, RpcClient::new(rpc_url.into()))
    }
}

impl<S, R> SolanaWallet<S, R> {
    /// Creates a wallet with default compute budget and balance checking on.
    pub const fn new(signer: S, rpc: R) -> Self {
        Self {
            signer,
            rpc,
            compute_unit_limit: DEFAULT_COMPUTE_UNIT_LIMIT,
            compute_unit_price: DEFAULT_COMPUTE_UNIT_PRICE,
            check_balance: true,
        }
    }

    /// Sets the compute unit limit.
    #[must_use]
    pub const fn with_compute_unit_limit(mut self, units: u32) -> Self {
        self.compute_unit_limit = units;
        self
    }

    /// Sets the priority fee in micro-lamports per compute unit.
    #[must_use]
    pub const fn with_compute_unit_price(mut self, micro_lamports: u64) -> Self {
        self.compute_unit_price = micro_lamports;
        self
    }

    /// Enables or disables the balance check before signing.
    #[must_use]
    pub const fn with_balance_check(mut self, check: bool) -> Self {
        self.check_balance = check;
        self
    }
}

impl<S: Signer, R: SolanaRpc> SolanaWallet<S, R> {
    /// The payer's public key.
    #[must_use]
    pub fn pubkey(&self) -> Pubkey {
        self.signer.pubkey()
    }

    /// Builds the unsigned transfer for `requirement`.
    ///
    /// Signature slots are present but empty.
    ///
    /// # Errors
    ///
    /// Returns a [`SolanaWalletError`] for malformed addresses or amounts, a
    /// mint that is not a token mint, a decimals mismatch, an insufficient
    /// balance, or RPC failures.
    pub async fn build_transfer(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<VersionedTransaction, SolanaWalletError> {
        let payer = self.signer.pubkey();
        let mint = parse_address("asset", &requirement.asset)?;
        let amount = requirement
            .max_amount_required
            .trim()
            .parse::<u64>()
            .map_err(|_| SolanaWalletError::InvalidAmount(requirement.max_amount_required.clone()))?;
        let fee_payer = match requirement.fee_payer() {
            Some(fee_payer) => parse_address("feePayer", fee_payer)?,
            None => payer,
        };

        let info = fetch_mint(&self.rpc, &mint).await?;
        match requirement.extra.as_ref().and_then(|e| e.decimals) {
            Some(stated) if stated != info.decimals => {
                return Err(SolanaWalletError::DecimalsMismatch {
                    mint,
                    stated,
                    actual: info.decimals,
                });
            }
            _ => {}
        }

        let destination = match requirement
            .extra
            .as_ref()
            .and_then(|e| e.recipient_token_account.as_deref())
        {
            Some(account) => parse_address("recipientTokenAccount", account)?,
            None => {
                let owner = parse_address("payTo", &requirement.pay_to)?;
                associated_token_address(&owner, &mint, &info.token_program)
            }
        };
        let source = associated_token_address(&payer, &mint, &info.token_program);

        if self.check_balance {
            let available = fetch_token_balance(&self.rpc, &source, &info.token_program)
                .await?
                .ok_or(SolanaWalletError::MissingTokenAccount {
                    account: source,
                    mint,
                })?;
            if available < amount {
                return Err(SolanaWalletError::InsufficientBalance {
                    required: amount,
                    available,
                });
            }
        }

        let transfer = if info.token_program == spl_token_2022::id() {
            spl_token_2022::instruction::transfer_checked(
                &info.token_program,
                &source,
                &mint,
                &destination,
                &payer,
                &[],
                amount,
                info.decimals,
            )
            .map_err(|e| SolanaWalletError::Build(e.to_string()))?
        } else {
            spl_token::instruction::transfer_checked(
                &info.token_program,
                &source,
                &mint,
                &destination,
                &payer,
                &[],
                amount,
                info.decimals,
            )
            .map_err(|e| SolanaWalletError::Build(e.to_string()))?
        };

        let mut instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(self.compute_unit_limit),
            ComputeBudgetInstruction::set_compute_unit_price(self.compute_unit_price),
            transfer,
        ];
        if let Some(memo) = requirement.memo() {
            instructions.push(memo_instruction(memo));
        }

        let blockhash = self.rpc.get_latest_blockhash().await?;
        let message = MessageV0::try_compile(&fee_payer, &instructions, &[], blockhash)
            .map_err(|e| SolanaWalletError::Build(e.to_string()))?;
        let required = usize::from(message.header.num_required_signatures);

        #[cfg(feature = "telemetry")]
        tracing::debug!(
            payer = %payer,
            fee_payer = %fee_payer,
            mint = %mint,
            amount,
            "built transfer"
        );

        Ok(VersionedTransaction {
            signatures: vec![Signature::default(); required],
            message: VersionedMessage::V0(message),
        })
    }

    /// Builds, signs and encodes the transfer for `requirement`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`build_transfer`](Self::build_transfer) or signing.
    pub async fn sign_requirement(
        &self,
        requirement: &PaymentRequirement,
    ) -> Result<SignedTransaction, SolanaWalletError> {
        let transaction = self.build_transfer(requirement).await?;
        self.sign(transaction)
    }

    /// Co-signs a base64 transaction built elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SolanaWalletError::Decode`] for a malformed transaction or
    /// [`SolanaWalletError::SignerNotRequired`] if this wallet is not a signer.
    pub fn cosign(&self, transaction: &str) -> Result<SignedTransaction, SolanaWalletError> {
        self.sign(decode_transaction(transaction)?)
    }

    fn sign(&self, transaction: VersionedTransaction) -> Result<SignedTransaction, SolanaWalletError> {
        let (transaction, signature) = sign_partial(transaction, &self.signer)?;
        Ok(SignedTransaction {
            transaction: encode_transaction(&transaction)?,
            signature: signature.to_string(),
        })
    }
}

impl<S, R> PaymentWallet for SolanaWallet<S, R>
where
    S: Signer + Send + Sync,
    R: SolanaRpc,
{
    fn address(&self) -> String {
        self.signer.pubkey().to_string()
    }

    fn build_and_sign<'a>(
        &'a self,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Result<SignedTransaction, WalletError>> {
        Box::pin(async move {
            self.sign_requirement(requirement)
                .await
                .map_err(WalletError::from)
        })
    }

    fn partially_sign<'a>(
        &'a self,
        transaction: &'a str,
    ) -> BoxFuture<'a, Result<SignedTransaction, WalletError>> {
        Box::pin(async move { self.cosign(transaction).map_err(WalletError::from) })
    }
}
