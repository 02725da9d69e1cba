use indexmap::IndexSet;

use crate::error::EngineError;
use crate::models::{ChargeRecord, Direction};

/// 台账加载代号: 发起请求时的往来单位/方向/序号
/// 返回时三者任一不再匹配, 结果视为过期丢弃
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerGeneration {
    pub counterparty_id: i64,
    pub direction: Direction,
    pub seq: u64,
}

/// 未开票费用的本地视图 (一个往来单位 + 一个收付方向)
/// 只读镜像: 不回写服务端, 勾选/过滤都是本地状态
#[derive(Debug)]
pub struct ChargeLedgerView {
    counterparty_id: i64,
    direction: Direction,
    seq: u64,
    charges: Vec<ChargeRecord>,
    selected: IndexSet<i64>,
    filter_keywords: Vec<String>,
    /// 无过滤词时的展示窗口上限, 仅影响展示, 不影响可选/聚合范围
    display_window: usize,
    loaded: bool,
}

impl ChargeLedgerView {
    pub fn new(counterparty_id: i64, direction: Direction, display_window: usize) -> Self {
        Self {
            counterparty_id,
            direction,
            seq: 0,
            charges: Vec::new(),
            selected: IndexSet::new(),
            filter_keywords: Vec::new(),
            display_window,
            loaded: false,
        }
    }

    pub fn counterparty_id(&self) -> i64 {
        self.counterparty_id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// 发起一次加载, 返回本次的代号
    pub fn begin_load(&mut self) -> LedgerGeneration {
        self.seq += 1;
        LedgerGeneration {
            counterparty_id: self.counterparty_id,
            direction: self.direction,
            seq: self.seq,
        }
    }

    /// 切换往来单位/方向: 清空本地状态并使在途请求全部过期
    pub fn retarget(&mut self, counterparty_id: i64, direction: Direction) {
        self.counterparty_id = counterparty_id;
        self.direction = direction;
        self.seq += 1;
        self.charges.clear();
        self.selected.clear();
        self.filter_keywords.clear();
        self.loaded = false;
    }

    /// 应用加载结果; 代号过期时丢弃并返回 false
    /// 服务端约定只返回未开票费用, 这里再按状态过滤一遍兜底
    pub fn apply_loaded(&mut self, token: LedgerGeneration, records: Vec<ChargeRecord>) -> bool {
        let current = LedgerGeneration {
            counterparty_id: self.counterparty_id,
            direction: self.direction,
            seq: self.seq,
        };
        if token != current {
            tracing::warn!(
                "丢弃过期的台账结果: 请求代号 {:?}, 当前 {:?}",
                token,
                current
            );
            return false;
        }

        let total = records.len();
        let charges: Vec<ChargeRecord> = records.into_iter().filter(|c| c.is_aggregable()).collect();
        if charges.len() < total {
            tracing::warn!("台账返回 {} 条, 过滤掉 {} 条不可聚合记录", total, total - charges.len());
        }

        // 重新加载后仅保留仍然存在的勾选
        let ids: IndexSet<i64> = charges.iter().map(|c| c.id).collect();
        self.selected.retain(|id| ids.contains(id));
        self.charges = charges;
        self.loaded = true;
        true
    }

    pub fn charges(&self) -> &[ChargeRecord] {
        &self.charges
    }

    pub fn charge(&self, id: i64) -> Option<&ChargeRecord> {
        self.charges.iter().find(|c| c.id == id)
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selected.contains(&id)
    }

    /// 勾选/取消单条费用
    pub fn toggle(&mut self, charge_id: i64) -> Result<bool, EngineError> {
        if self.charge(charge_id).is_none() {
            return Err(EngineError::Validation(format!("费用 {} 不在当前台账中", charge_id)));
        }
        if self.selected.shift_remove(&charge_id) {
            Ok(false)
        } else {
            self.selected.insert(charge_id);
            Ok(true)
        }
    }

    /// 按箱号(或运单号)整组翻转:
    /// 全部已勾选 -> 全部取消; 否则 -> 全部勾选
    pub fn toggle_by_container(&mut self, container_key: &str) -> Result<bool, EngineError> {
        let group: Vec<i64> = self
            .charges
            .iter()
            .filter(|c| c.container_key() == container_key)
            .map(|c| c.id)
            .collect();
        if group.is_empty() {
            return Err(EngineError::Validation(format!(
                "箱号/运单号 {} 没有对应的费用",
                container_key
            )));
        }
        let all_selected = group.iter().all(|id| self.selected.contains(id));
        if all_selected {
            for id in &group {
                self.selected.shift_remove(id);
            }
        } else {
            for id in group {
                self.selected.insert(id);
            }
        }
        Ok(!all_selected)
    }

    /// 辅助: 直接置为勾选 (导入匹配联动用)
    pub fn select(&mut self, charge_id: i64) {
        if self.charge(charge_id).is_some() {
            self.selected.insert(charge_id);
        }
    }

    pub fn deselect(&mut self, charge_id: i64) {
        self.selected.shift_remove(&charge_id);
    }

    /// 设置过滤词 (保留非空, 统一小写)
    pub fn set_filter(&mut self, keywords: Vec<String>) {
        self.filter_keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
    }

    pub fn filter_keywords(&self) -> &[String] {
        &self.filter_keywords
    }

    /// 展示行: 过滤词对箱号/运单号做不区分大小写的子串匹配, 多词取并集;
    /// 无过滤词时截断到展示窗口
    pub fn visible(&self) -> Vec<&ChargeRecord> {
        if self.filter_keywords.is_empty() {
            return self.charges.iter().take(self.display_window).collect();
        }
        self.charges
            .iter()
            .filter(|c| {
                let container = c
                    .container_number
                    .as_deref()
                    .unwrap_or_default()
                    .to_lowercase();
                let shipment = c.shipment_number.to_lowercase();
                self.filter_keywords
                    .iter()
                    .any(|k| container.contains(k) || shipment.contains(k))
            })
            .collect()
    }

    /// 已勾选的费用, 按台账顺序返回 (聚合的输入顺序由此决定)
    pub fn selected_records(&self) -> Vec<&ChargeRecord> {
        self.charges
            .iter()
            .filter(|c| self.selected.contains(&c.id))
            .collect()
    }

    pub fn selected_ids(&self) -> Vec<i64> {
        self.charges
            .iter()
            .filter(|c| self.selected.contains(&c.id))
            .map(|c| c.id)
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalStatus, InvoiceStatus};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn charge(id: i64, container: Option<&str>, shipment: &str) -> ChargeRecord {
        ChargeRecord {
            id,
            fee_name: format!("费用{}", id),
            category: "海运费".to_string(),
            amount: BigDecimal::from_str("100.00").unwrap(),
            currency: "CNY".to_string(),
            shipment_id: id * 10,
            shipment_number: shipment.to_string(),
            container_number: container.map(|s| s.to_string()),
            counterparty_id: 1,
            counterparty_name: "测试货代".to_string(),
            direction: Direction::Receivable,
            approval_status: Some(ApprovalStatus::Approved),
            invoice_status: InvoiceStatus::Open,
            is_locked: false,
            is_supplementary: false,
        }
    }

    fn loaded_view(records: Vec<ChargeRecord>) -> ChargeLedgerView {
        let mut view = ChargeLedgerView::new(1, Direction::Receivable, 200);
        let token = view.begin_load();
        assert!(view.apply_loaded(token, records));
        view
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut view = ChargeLedgerView::new(1, Direction::Receivable, 200);
        let stale = view.begin_load();
        // 用户切换了往来单位, 旧请求还在途
        view.retarget(2, Direction::Receivable);
        assert!(!view.apply_loaded(stale, vec![charge(1, None, "SH001")]));
        assert!(!view.is_loaded());

        let fresh = view.begin_load();
        assert!(view.apply_loaded(fresh, vec![charge(2, None, "SH002")]));
        assert_eq!(view.charges().len(), 1);
    }

    #[test]
    fn newer_load_supersedes_older_inflight() {
        let mut view = ChargeLedgerView::new(1, Direction::Receivable, 200);
        let first = view.begin_load();
        let second = view.begin_load();
        assert!(!view.apply_loaded(first, vec![charge(1, None, "SH001")]));
        assert!(view.apply_loaded(second, vec![charge(2, None, "SH002")]));
    }

    #[test]
    fn invoiced_records_never_become_selectable() {
        let mut invoiced = charge(3, None, "SH003");
        invoiced.invoice_status = InvoiceStatus::Invoiced;
        let view = loaded_view(vec![charge(1, None, "SH001"), invoiced]);
        assert_eq!(view.charges().len(), 1);
        assert!(view.charge(3).is_none());
    }

    #[test]
    fn container_toggle_is_symmetric_from_uniform_state() {
        let mut view = loaded_view(vec![
            charge(1, Some("ABCD1234567"), "SH001"),
            charge(2, Some("ABCD1234567"), "SH002"),
            charge(3, Some("EFGH7654321"), "SH003"),
        ]);
        // 组内勾选一致时两次整组翻转恢复原状, 不影响组外
        view.toggle(3).unwrap();
        view.toggle_by_container("ABCD1234567").unwrap();
        assert_eq!(view.selected_ids(), vec![1, 2, 3]);
        view.toggle_by_container("ABCD1234567").unwrap();
        assert_eq!(view.selected_ids(), vec![3]);
    }

    #[test]
    fn mixed_container_group_selects_all_before_clearing() {
        // 组内勾选不一致时第一次翻转先补齐全选, 再翻一次才是全不选;
        // 混合起点经过两次翻转不会回到混合状态
        let mut view = loaded_view(vec![
            charge(1, Some("ABCD1234567"), "SH001"),
            charge(2, Some("ABCD1234567"), "SH002"),
        ]);
        view.toggle(2).unwrap();
        assert!(view.toggle_by_container("ABCD1234567").unwrap());
        assert_eq!(view.selected_ids(), vec![1, 2]);
        assert!(!view.toggle_by_container("ABCD1234567").unwrap());
        assert!(view.selected_ids().is_empty());
    }

    #[test]
    fn container_toggle_falls_back_to_shipment_number() {
        let mut view = loaded_view(vec![charge(1, None, "SH001"), charge(2, None, "SH001")]);
        view.toggle_by_container("SH001").unwrap();
        assert_eq!(view.selected_count(), 2);
    }

    #[test]
    fn filter_is_case_insensitive_or_across_keywords() {
        let mut view = loaded_view(vec![
            charge(1, Some("ABCD1234567"), "SH001"),
            charge(2, None, "sh002"),
            charge(3, Some("WXYZ0000001"), "SH003"),
        ]);
        view.set_filter(vec!["abcd".to_string(), "SH002".to_string()]);
        let visible: Vec<i64> = view.visible().iter().map(|c| c.id).collect();
        assert_eq!(visible, vec![1, 2]);
    }

    #[test]
    fn display_window_caps_view_but_not_selection() {
        let records: Vec<ChargeRecord> = (1..=10).map(|i| charge(i, None, &format!("SH{:03}", i))).collect();
        let mut view = ChargeLedgerView::new(1, Direction::Receivable, 3);
        let token = view.begin_load();
        view.apply_loaded(token, records);

        assert_eq!(view.visible().len(), 3);
        // 窗口外的记录仍然可选
        view.toggle(9).unwrap();
        assert_eq!(view.selected_ids(), vec![9]);
    }

    #[test]
    fn reload_drops_selection_of_vanished_charges() {
        let mut view = loaded_view(vec![charge(1, None, "SH001"), charge(2, None, "SH002")]);
        view.toggle(1).unwrap();
        view.toggle(2).unwrap();

        // 并发开票导致费用1从未开票集合消失
        let token = view.begin_load();
        view.apply_loaded(token, vec![charge(2, None, "SH002")]);
        assert_eq!(view.selected_ids(), vec![2]);
    }
}
