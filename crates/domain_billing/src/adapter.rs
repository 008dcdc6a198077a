//! Payment intents for pending bookings

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use core_kernel::{BookingId, Clock, Currency, Money, PaymentId, UserId};
use domain_booking::{Booking, BookingPort, BookingStatus};
use domain_pricing::Addon;
use domain_verification::VerificationPort;

use crate::commission::{CommissionCalculator, Settlement};
use crate::error::BillingError;
use crate::payment::{FeeSplit, Payment, PaymentStatus};
use crate::ports::{PaymentPort, RearmPayment};
use crate::processor::{CreateIntentRequest, IntentStatus, PaymentProcessor, ProcessorError, ProcessorIntent, Transfer};

/// Flat price per add-on, in the booking's currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonPricing {
    pub screen_sharing: Decimal,
    pub translation: Decimal,
    pub recording: Decimal,
    pub transcription: Decimal,
}

impl Default for AddonPricing {
    fn default() -> Self {
        Self {
            screen_sharing: dec!(5),
            translation: dec!(25),
            recording: dec!(10),
            transcription: dec!(10),
        }
    }
}

impl AddonPricing {
    pub fn price_of(&self, addon: Addon, currency: Currency) -> Money {
        let amount = match addon {
            Addon::ScreenSharing => self.screen_sharing,
            Addon::Translation => self.translation,
            Addon::Recording => self.recording,
            Addon::Transcription => self.transcription,
        };
        Money::new(amount, currency).round_to_currency()
    }

    /// Tariff price plus every selected add-on
    pub fn gross_for(&self, booking: &Booking) -> Result<Money, BillingError> {
        let currency = booking.price.currency();
        let addons: Vec<Money> = booking.services.iter().map(|a| self.price_of(*a, currency)).collect();
        Ok(booking.price.checked_add(&Money::sum(currency, addons.iter())?)?)
    }
}

/// What the browser needs to confirm the payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentHandle {
    pub client_secret: String,
    pub intent_id: String,
    pub payment_id: PaymentId,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentStatusView {
    pub intent_id: String,
    pub payment_id: PaymentId,
    pub booking_id: BookingId,
    /// Our record, moved only by webhooks
    pub payment_status: PaymentStatus,
    /// The processor's view; absent when the processor could not be reached
    pub processor_status: Option<IntentStatus>,
}

#[derive(Clone)]
pub struct PaymentAdapter {
    bookings: Arc<dyn BookingPort>,
    payments: Arc<dyn PaymentPort>,
    verifications: Arc<dyn VerificationPort>,
    processor: Arc<dyn PaymentProcessor>,
    calculator: CommissionCalculator,
    addon_pricing: AddonPricing,
    clock: Arc<dyn Clock>,
}

impl PaymentAdapter {
    pub fn new(
        bookings: Arc<dyn BookingPort>,
        payments: Arc<dyn PaymentPort>,
        verifications: Arc<dyn VerificationPort>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            payments,
            verifications,
            processor,
            calculator: CommissionCalculator::default(),
            addon_pricing: AddonPricing::default(),
            clock,
        }
    }

    pub fn with_calculator(mut self, calculator: CommissionCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_addon_pricing(mut self, addon_pricing: AddonPricing) -> Self {
        self.addon_pricing = addon_pricing;
        self
    }

    /// Creates, or returns the live, payment intent for a pending booking
    ///
    /// The booking is never modified here; only the webhook confirms it.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless `actor_id` is the booking's guest
    /// - `InvalidState` when the booking is not pending or is already paid
    /// - `Processor` when the processor call fails
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn create_intent(&self, booking_id: BookingId, actor_id: UserId) -> Result<IntentHandle, BillingError> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Booking {}", booking_id)))?;
        if booking.guest_id != actor_id {
            return Err(BillingError::Forbidden(format!("booking {}", booking_id)));
        }
        if booking.status != BookingStatus::Pending {
            return Err(BillingError::invalid_state(format!("booking {} is {}", booking_id, booking.status)));
        }

        match self.payments.get_payment_for_booking(booking_id).await? {
            None => self.first_attempt(&booking).await,
            Some(payment) => self.resume(&booking, payment).await,
        }
    }

    /// Reads the payment behind an intent together with the processor's status
    #[instrument(skip(self))]
    pub async fn get_status(&self, intent_id: &str, actor_id: UserId) -> Result<IntentStatusView, BillingError> {
        let payment = self
            .payments
            .get_payment_by_intent(intent_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Payment intent {}", intent_id)))?;
        let booking = self
            .bookings
            .get_booking(payment.booking_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Booking {}", payment.booking_id)))?;
        if booking.party_of(actor_id).is_none() {
            return Err(BillingError::Forbidden(format!("payment intent {}", intent_id)));
        }

        let processor_status = match self.processor.retrieve_intent(&payment.processor_intent_id).await {
            Ok(intent) => Some(intent.status),
            Err(err) => {
                warn!(error = %err, "Could not fetch intent status from processor");
                None
            }
        };

        Ok(IntentStatusView {
            intent_id: payment.processor_intent_id,
            payment_id: payment.id,
            booking_id: payment.booking_id,
            payment_status: payment.status,
            processor_status,
        })
    }

    async fn first_attempt(&self, booking: &Booking) -> Result<IntentHandle, BillingError> {
        let payment_id = PaymentId::new();
        let (settlement, fee_split) = self.price(booking).await?;
        let intent = self.request_intent(booking, payment_id, 1, &settlement, &fee_split).await?;

        let payment = Payment::pending(payment_id, booking.id, &intent.id, &settlement, fee_split, self.clock.now());
        match self.payments.insert_payment(payment).await {
            Ok(payment) => {
                info!(payment_id = %payment.id, intent_id = %intent.id, amount = %payment.amount, "Payment intent created");
                Ok(handle(intent, payment.id))
            }
            Err(err) if err.is_conflict() => {
                // Another request for the same booking won the insert
                let existing = self
                    .payments
                    .get_payment_for_booking(booking.id)
                    .await?
                    .ok_or_else(|| BillingError::invalid_state("payment disappeared during creation"))?;
                warn!(intent_id = %intent.id, kept = %existing.processor_intent_id, "Concurrent intent creation, discarding ours");
                self.resume(booking, existing).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn resume(&self, booking: &Booking, payment: Payment) -> Result<IntentHandle, BillingError> {
        match payment.status {
            PaymentStatus::Pending => {
                let intent = self
                    .processor
                    .retrieve_intent(&payment.processor_intent_id)
                    .await
                    .map_err(|err| processor_failure(&err))?;
                Ok(handle(intent, payment.id))
            }
            PaymentStatus::Succeeded => Err(BillingError::invalid_state(format!(
                "booking {} is already paid",
                booking.id
            ))),
            PaymentStatus::Failed => {
                self.retire_intent(booking, &payment.processor_intent_id).await?;
                let attempt = payment.attempts + 1;
                let (settlement, fee_split) = self.price(booking).await?;
                let intent = self
                    .request_intent(booking, payment.id, attempt, &settlement, &fee_split)
                    .await?;
                let rearm = RearmPayment {
                    payment_id: payment.id,
                    previous_intent_id: payment.processor_intent_id.clone(),
                    intent_id: intent.id.clone(),
                    settlement,
                    fee_split,
                    at: self.clock.now(),
                };
                self.payments
                    .rearm_payment(rearm)
                    .await?
                    .ok_or_else(|| BillingError::invalid_state("payment changed while retrying"))?;
                info!(payment_id = %payment.id, intent_id = %intent.id, attempt, "Failed payment re-armed");
                Ok(handle(intent, payment.id))
            }
        }
    }

    /// Cancels the failed attempt's intent before a new one is issued, so
    /// the guest can be charged through one intent at most. An intent that
    /// turned out to be paid is left alone and its webhook settles the booking.
    async fn retire_intent(&self, booking: &Booking, intent_id: &str) -> Result<(), BillingError> {
        let intent = self
            .processor
            .retrieve_intent(intent_id)
            .await
            .map_err(|err| processor_failure(&err))?;
        match intent.status {
            IntentStatus::Canceled => Ok(()),
            IntentStatus::Succeeded | IntentStatus::Processing => {
                warn!(intent_id, status = %intent.status, "Failed payment's intent is being paid after all");
                Err(BillingError::invalid_state(format!(
                    "payment for booking {} is already being processed",
                    booking.id
                )))
            }
            _ => {
                self.processor
                    .cancel_intent(intent_id)
                    .await
                    .map_err(|err| processor_failure(&err))?;
                info!(intent_id, "Superseded intent cancelled");
                Ok(())
            }
        }
    }

    async fn price(&self, booking: &Booking) -> Result<(Settlement, Option<FeeSplit>), BillingError> {
        let gross = self.addon_pricing.gross_for(booking)?;
        let settlement = self.calculator.split(&gross)?;

        let host = self.verifications.get_verification(booking.host_id).await?;
        let fee_split = match host {
            Some(host) if host.can_receive_transfers() => match host.connected_account_id {
                Some(destination_account) => Some(FeeSplit {
                    destination_account,
                    application_fee: settlement.platform_fee()?,
                }),
                None => None,
            },
            _ => None,
        };
        Ok((settlement, fee_split))
    }

    async fn request_intent(
        &self,
        booking: &Booking,
        payment_id: PaymentId,
        attempt: u32,
        settlement: &Settlement,
        fee_split: &Option<FeeSplit>,
    ) -> Result<ProcessorIntent, BillingError> {
        let request = CreateIntentRequest {
            amount: settlement.gross,
            idempotency_key: Payment::idempotency_key(payment_id, attempt),
            booking_id: booking.id,
            payment_id,
            transfer: fee_split.as_ref().map(|split| Transfer {
                destination: split.destination_account.clone(),
                application_fee: split.application_fee,
            }),
        };
        self.processor
            .create_intent(request)
            .await
            .map_err(|err| processor_failure(&err))
    }
}

fn handle(intent: ProcessorIntent, payment_id: PaymentId) -> IntentHandle {
    IntentHandle {
        client_secret: intent.client_secret,
        intent_id: intent.id,
        payment_id,
        amount: intent.amount,
    }
}

fn processor_failure(err: &ProcessorError) -> BillingError {
    error!(error = %err, retryable = err.is_retryable(), "Payment processor call failed");
    BillingError::Processor(err.clone())
}
