//! Default route catalog
//!
//! One descriptor per batch command: clients, loans and their charges, transactions and
//! reschedules, savings accounts and datatables. `#` marks a numeric identifier placeholder.

use std::fmt;

use crate::handler::ResourceFamily;
use crate::model::Method;
use crate::routing::RouteDescriptor;

macro_rules! operations {
    ($($variant:ident => $family:ident),* $(,)?) => {
        /// Operation a route performs.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Operation {
            $($variant),*
        }

        impl Operation {
            pub const ALL: &'static [Operation] = &[$(Operation::$variant),*];

            pub fn family(&self) -> ResourceFamily {
                match self {
                    $(Operation::$variant => ResourceFamily::$family),*
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Operation::$variant => stringify!($variant)),*
                }
            }
        }
    };
}

operations! {
    CreateClient => Clients,
    GetClientById => Clients,
    GetClientByExternalId => Clients,
    UpdateClient => Clients,
    ClientStateTransition => Clients,

    ApplyLoan => Loans,
    GetLoanById => Loans,
    GetLoanByExternalId => Loans,
    ModifyLoanApplication => Loans,
    ModifyLoanApplicationByExternalId => Loans,
    LoanStateTransition => Loans,
    LoanStateTransitionByExternalId => Loans,

    CreateLoanCharge => LoanCharges,
    CollectLoanCharges => LoanCharges,
    GetLoanChargeById => LoanCharges,
    AdjustLoanCharge => LoanCharges,
    CreateLoanChargeByLoanExternalId => LoanCharges,
    CollectLoanChargesByLoanExternalId => LoanCharges,
    GetLoanChargeByExternalId => LoanCharges,
    AdjustLoanChargeByExternalId => LoanCharges,

    CreateLoanTransaction => LoanTransactions,
    CreateLoanTransactionByLoanExternalId => LoanTransactions,
    GetLoanTransactionById => LoanTransactions,
    GetLoanTransactionByExternalId => LoanTransactions,
    AdjustLoanTransaction => LoanTransactions,
    ChargebackLoanTransaction => LoanTransactions,
    AdjustLoanTransactionByExternalId => LoanTransactions,
    ChargebackLoanTransactionByExternalId => LoanTransactions,

    CreateLoanRescheduleRequest => LoanReschedules,
    LoanRescheduleDecision => LoanReschedules,

    ApplySavingsAccount => SavingsAccounts,
    GetSavingsAccountById => SavingsAccounts,
    ModifySavingsAccount => SavingsAccounts,
    SavingsStateTransition => SavingsAccounts,
    CreateSavingsTransaction => SavingsAccounts,
    ReleaseSavingsAmount => SavingsAccounts,

    QueryDatatable => Datatables,
    GetDatatableEntries => Datatables,
    GetDatatableEntryById => Datatables,
    ReadDatatablePath => Datatables,
    CreateDatatableEntry => Datatables,
    UpdateDatatableEntryOneToOne => Datatables,
    UpdateDatatableEntryOneToMany => Datatables,
    DeleteDatatableEntries => Datatables,
    DeleteDatatableEntry => Datatables,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const CLIENT_COMMANDS: &[&str] = &["activate", "close", "reject", "withdraw", "reactivate"];

pub const LOAN_COMMANDS: &[&str] = &[
    "approve",
    "disburse",
    "disburseToSavings",
    "reject",
    "withdrawnByApplicant",
    "undoapproval",
    "undodisbursal",
    "assignloanofficer",
    "unassignloanofficer",
    "recoverGuarantees",
];

pub const LOAN_CHARGE_COMMANDS: &[&str] = &["adjustment"];

pub const LOAN_TRANSACTION_COMMANDS: &[&str] = &[
    "repayment",
    "merchantIssuedRefund",
    "payoutRefund",
    "goodwillCredit",
    "chargeRefund",
    "creditBalanceRefund",
    "waiveInterest",
    "writeoff",
    "recoverypayment",
    "foreclosure",
    "chargeOff",
    "downPayment",
    "interestPaymentWaiver",
];

pub const CHARGEBACK_COMMANDS: &[&str] = &["chargeback"];

pub const RESCHEDULE_COMMANDS: &[&str] = &["approve", "reject"];

pub const SAVINGS_COMMANDS: &[&str] = &["approve", "activate", "close", "reject", "withdrawnByApplicant"];

pub const SAVINGS_TRANSACTION_COMMANDS: &[&str] = &["deposit", "withdrawal", "holdAmount"];

pub const SAVINGS_RELEASE_COMMANDS: &[&str] = &["releaseAmount"];

use Method::{Delete, Get, Post, Put};
use Operation::*;

const fn route(method: Method, pattern: &'static str, operation: Operation) -> RouteDescriptor {
    RouteDescriptor::new(method, pattern, operation)
}

const ROUTES: &[RouteDescriptor] = &[
    // clients
    route(Post, "clients", CreateClient),
    route(Get, "clients/{clientId#}", GetClientById),
    route(Get, "clients/external-id/{clientExternalId}", GetClientByExternalId),
    route(Put, "clients/{clientId#}", UpdateClient),
    route(Post, "clients/{clientId#}", ClientStateTransition).with_commands(CLIENT_COMMANDS),
    // loans
    route(Post, "loans", ApplyLoan),
    route(Get, "loans/{loanId#}", GetLoanById),
    route(Get, "loans/external-id/{loanExternalId}", GetLoanByExternalId),
    route(Put, "loans/{loanId#}", ModifyLoanApplication),
    route(Put, "loans/external-id/{loanExternalId}", ModifyLoanApplicationByExternalId),
    route(Post, "loans/{loanId#}", LoanStateTransition).with_commands(LOAN_COMMANDS),
    route(Post, "loans/external-id/{loanExternalId}", LoanStateTransitionByExternalId)
        .with_commands(LOAN_COMMANDS),
    // loan charges
    route(Post, "loans/{loanId#}/charges", CreateLoanCharge),
    route(Get, "loans/{loanId#}/charges", CollectLoanCharges),
    route(Get, "loans/{loanId#}/charges/{chargeId#}", GetLoanChargeById),
    route(Post, "loans/{loanId#}/charges/{chargeId#}", AdjustLoanCharge)
        .with_commands(LOAN_CHARGE_COMMANDS),
    route(Post, "loans/external-id/{loanExternalId}/charges", CreateLoanChargeByLoanExternalId),
    route(Get, "loans/external-id/{loanExternalId}/charges", CollectLoanChargesByLoanExternalId),
    route(
        Get,
        "loans/external-id/{loanExternalId}/charges/external-id/{chargeExternalId}",
        GetLoanChargeByExternalId,
    ),
    route(
        Post,
        "loans/external-id/{loanExternalId}/charges/external-id/{chargeExternalId}",
        AdjustLoanChargeByExternalId,
    )
    .with_commands(LOAN_CHARGE_COMMANDS),
    // loan transactions
    route(Post, "loans/{loanId#}/transactions", CreateLoanTransaction)
        .with_commands(LOAN_TRANSACTION_COMMANDS),
    route(
        Post,
        "loans/external-id/{loanExternalId}/transactions",
        CreateLoanTransactionByLoanExternalId,
    )
    .with_commands(LOAN_TRANSACTION_COMMANDS),
    route(Get, "loans/{loanId#}/transactions/{transactionId#}", GetLoanTransactionById),
    route(
        Get,
        "loans/external-id/{loanExternalId}/transactions/external-id/{transactionExternalId}",
        GetLoanTransactionByExternalId,
    ),
    route(Post, "loans/{loanId#}/transactions/{transactionId#}", AdjustLoanTransaction),
    route(Post, "loans/{loanId#}/transactions/{transactionId#}", ChargebackLoanTransaction)
        .with_commands(CHARGEBACK_COMMANDS),
    route(
        Post,
        "loans/external-id/{loanExternalId}/transactions/external-id/{transactionExternalId}",
        AdjustLoanTransactionByExternalId,
    ),
    route(
        Post,
        "loans/external-id/{loanExternalId}/transactions/external-id/{transactionExternalId}",
        ChargebackLoanTransactionByExternalId,
    )
    .with_commands(CHARGEBACK_COMMANDS),
    // loan reschedules
    route(Post, "rescheduleloans", CreateLoanRescheduleRequest),
    route(Post, "rescheduleloans/{scheduleId#}", LoanRescheduleDecision)
        .with_commands(RESCHEDULE_COMMANDS),
    // savings accounts
    route(Post, "savingsaccounts", ApplySavingsAccount),
    route(Get, "savingsaccounts/{savingsId#}", GetSavingsAccountById),
    route(Put, "savingsaccounts/{savingsId#}", ModifySavingsAccount),
    route(Post, "savingsaccounts/{savingsId#}", SavingsStateTransition)
        .with_commands(SAVINGS_COMMANDS),
    route(Post, "savingsaccounts/{savingsId#}/transactions", CreateSavingsTransaction)
        .with_commands(SAVINGS_TRANSACTION_COMMANDS),
    route(
        Post,
        "savingsaccounts/{savingsId#}/transactions/{transactionId#}",
        ReleaseSavingsAmount,
    )
    .with_commands(SAVINGS_RELEASE_COMMANDS),
    // datatables
    route(Get, "datatables/{datatable}/query", QueryDatatable),
    route(Get, "datatables/{datatable}/{appTableId#}", GetDatatableEntries),
    route(Get, "datatables/{datatable}/{appTableId#}/{datatableId#}", GetDatatableEntryById),
    route(Get, "datatables/{datatable}/{path..}", ReadDatatablePath),
    route(Post, "datatables/{datatable}/{appTableId#}", CreateDatatableEntry),
    route(Put, "datatables/{datatable}/{appTableId#}", UpdateDatatableEntryOneToOne),
    route(Put, "datatables/{datatable}/{appTableId#}/{datatableId#}", UpdateDatatableEntryOneToMany),
    route(Delete, "datatables/{datatable}/{appTableId#}", DeleteDatatableEntries),
    route(Delete, "datatables/{datatable}/{appTableId#}/{datatableId#}", DeleteDatatableEntry),
];

/// The default route table.
pub fn routes() -> &'static [RouteDescriptor] {
    ROUTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_operation_has_exactly_one_route() {
        let mut seen = HashSet::new();
        for descriptor in routes() {
            assert!(
                seen.insert(descriptor.operation),
                "{} is routed twice",
                descriptor.operation
            );
        }
        assert_eq!(seen.len(), Operation::ALL.len());
    }

    #[test]
    fn families_follow_operations() {
        assert_eq!(Operation::AdjustLoanCharge.family(), ResourceFamily::LoanCharges);
        assert_eq!(Operation::ReadDatatablePath.family(), ResourceFamily::Datatables);
        assert_eq!(Operation::GetLoanById.to_string(), "GetLoanById");
    }
}
