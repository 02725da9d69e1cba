//! 端到端流程: 加载台账 -> 勾选/导入 -> 聚合 -> 提交 -> 重新加载
//! 协作服务用内存实现代替, 核销语义由假台账模拟

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use fee_recon_rust::clients::{InvoicePayload, InvoicingService, LedgerService};
use fee_recon_rust::models::{
    ApprovalStatus, ChargeRecord, Direction, InvoiceStatus,
};
use fee_recon_rust::{ComposerSession, EngineError, SessionSetup};

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn charge(id: i64, fee_name: &str, amount: &str) -> ChargeRecord {
    ChargeRecord {
        id,
        fee_name: fee_name.to_string(),
        category: "海运费".to_string(),
        amount: dec(amount),
        currency: "CNY".to_string(),
        shipment_id: id * 10,
        shipment_number: format!("SH{:03}", id),
        container_number: Some(format!("CONT{:07}", id)),
        counterparty_id: 1,
        counterparty_name: "ACME".to_string(),
        direction: Direction::Receivable,
        approval_status: Some(ApprovalStatus::Approved),
        invoice_status: InvoiceStatus::Open,
        is_locked: false,
        is_supplementary: false,
    }
}

/// 假台账: 共享存储, 核销后从未开票集合消失
struct FakeLedger {
    store: Arc<Mutex<Vec<ChargeRecord>>>,
}

#[async_trait]
impl LedgerService for FakeLedger {
    async fn list_open_charges(
        &self,
        counterparty_id: i64,
        direction: Direction,
    ) -> Result<Vec<ChargeRecord>, EngineError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.counterparty_id == counterparty_id
                    && c.direction == direction
                    && c.invoice_status == InvoiceStatus::Open
            })
            .cloned()
            .collect())
    }
}

/// 假开票服务: 成功时在共享存储里把来源费用标记为已核销
struct FakeInvoicing {
    store: Arc<Mutex<Vec<ChargeRecord>>>,
    submissions: Mutex<Vec<InvoicePayload>>,
}

impl FakeInvoicing {
    fn consume(&self, payload: &InvoicePayload) {
        let mut ids: Vec<i64> = payload.items.iter().filter_map(|i| i.charge_id).collect();
        ids.extend(&payload.additional_charge_ids);
        let mut store = self.store.lock().unwrap();
        for c in store.iter_mut() {
            if ids.contains(&c.id) {
                c.invoice_status = InvoiceStatus::Invoiced;
            }
        }
    }
}

#[async_trait]
impl InvoicingService for FakeInvoicing {
    async fn create(&self, payload: &InvoicePayload) -> Result<i64, EngineError> {
        self.consume(payload);
        self.submissions.lock().unwrap().push(payload.clone());
        Ok(1000 + self.submissions.lock().unwrap().len() as i64)
    }

    async fn update(&self, invoice_id: i64, payload: &InvoicePayload) -> Result<i64, EngineError> {
        self.consume(payload);
        self.submissions.lock().unwrap().push(payload.clone());
        Ok(invoice_id)
    }
}

fn session() -> ComposerSession {
    ComposerSession::new(
        SessionSetup {
            counterparty_id: Some(1),
            counterparty_name: "ACME".to_string(),
            ..SessionSetup::default()
        },
        200,
    )
}

#[tokio::test]
async fn submitted_charges_are_never_reoffered() {
    let store = Arc::new(Mutex::new(vec![
        charge(1, "海运费", "800.00"),
        charge(2, "文件费", "45.00"),
        charge(3, "报关费", "120.00"),
    ]));
    let ledger = FakeLedger { store: store.clone() };
    let invoicing = FakeInvoicing {
        store: store.clone(),
        submissions: Mutex::new(Vec::new()),
    };

    let mut s = session();
    let (token, cid, dir) = s.begin_ledger_load().unwrap();
    let records = ledger.list_open_charges(cid, dir).await.unwrap();
    assert!(s.apply_ledger_loaded(token, records));
    assert_eq!(s.ledger().charges().len(), 3);

    s.toggle_charge(1).unwrap();
    s.toggle_charge(2).unwrap();
    s.aggregate_selection(false).unwrap();
    let doc = s.compose().unwrap();
    s.validate_for_submit(&doc).unwrap();

    let payload = InvoicePayload::from_document(&doc);
    let invoice_id = invoicing.create(&payload).await.unwrap();
    s.on_submitted(invoice_id, &doc);

    // 提交后必须重新拉取; 已核销的费用不得再次出现
    let (token, cid, dir) = s.begin_ledger_load().unwrap();
    let records = ledger.list_open_charges(cid, dir).await.unwrap();
    assert!(s.apply_ledger_loaded(token, records));
    let remaining: Vec<i64> = s.ledger().charges().iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec![3]);
    for id in doc.items.iter().flat_map(|i| i.source_charge_ids.iter()) {
        assert!(!remaining.contains(id));
    }
}

#[tokio::test]
async fn edit_mode_resubmits_whole_item_list() {
    let store = Arc::new(Mutex::new(vec![charge(1, "海运费", "800.00")]));
    let ledger = FakeLedger { store: store.clone() };
    let invoicing = FakeInvoicing {
        store: store.clone(),
        submissions: Mutex::new(Vec::new()),
    };

    let mut s = ComposerSession::new(
        SessionSetup {
            counterparty_id: Some(1),
            counterparty_name: "ACME".to_string(),
            invoice_id: Some(77),
            ..SessionSetup::default()
        },
        200,
    );
    let (token, cid, dir) = s.begin_ledger_load().unwrap();
    let records = ledger.list_open_charges(cid, dir).await.unwrap();
    s.apply_ledger_loaded(token, records);
    s.toggle_charge(1).unwrap();
    s.aggregate_selection(false).unwrap();

    let doc = s.compose().unwrap();
    s.validate_for_submit(&doc).unwrap();
    let payload = InvoicePayload::from_document(&doc);
    let id = invoicing.update(77, &payload).await.unwrap();
    assert_eq!(id, 77);

    // 整单替换: 载荷携带全部明细而非差量
    let submissions = invoicing.submissions.lock().unwrap();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].items.len(), doc.items.len());
}

#[tokio::test]
async fn additional_charge_ids_are_consumed_too() {
    let store = Arc::new(Mutex::new(vec![
        charge(1, "海运费", "800.00"),
        charge(2, "文件费", "45.00"),
    ]));
    let ledger = FakeLedger { store: store.clone() };
    let invoicing = FakeInvoicing {
        store: store.clone(),
        submissions: Mutex::new(Vec::new()),
    };

    let mut s = session();
    let (token, cid, dir) = s.begin_ledger_load().unwrap();
    let records = ledger.list_open_charges(cid, dir).await.unwrap();
    s.apply_ledger_loaded(token, records);

    s.toggle_charge(1).unwrap();
    s.aggregate_selection(false).unwrap();
    // 聚合后补勾的费用走 additionalChargeIds
    s.toggle_charge(2).unwrap();

    let doc = s.compose().unwrap();
    assert_eq!(doc.additional_charge_ids, vec![2]);
    let payload = InvoicePayload::from_document(&doc);
    let id = invoicing.create(&payload).await.unwrap();
    s.on_submitted(id, &doc);

    let (token, cid, dir) = s.begin_ledger_load().unwrap();
    let records = ledger.list_open_charges(cid, dir).await.unwrap();
    s.apply_ledger_loaded(token, records);
    assert!(s.ledger().charges().is_empty());
}
