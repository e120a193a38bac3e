//! 各状态下的选项选择（纯函数，不做 I/O）
//!
//! 快照所处的逻辑步骤只由 *内容* 推断（是否还有列表标记），从不依赖消息序号：
//! 远端每一步都会发出多次编辑，没有可靠的步骤边界信号。

use crate::automation::loop_guard::LoopGuard;
use crate::automation::matcher::{first_match, SelectionRules};
use crate::automation::snapshot::{MenuOption, MenuSnapshot};
use crate::config::SelectionStrategy;
use crate::core::{AutomationError, AutomationState};

/// 暂不动作的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// 键盘为空（远端仍在加载）
    EmptyKeyboard,
    /// 详情阶段又看到列表标记：乱序到达的旧快照
    ListMarkersReappeared,
}

/// 状态机在一个快照上的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 点击一个选项，远端确认后进入 `next`
    Invoke {
        option: MenuOption,
        next: AutomationState,
        reason: &'static str,
    },
    /// 依次点击全部选项（invoke-all 策略）
    InvokeAll {
        options: Vec<MenuOption>,
        next: AutomationState,
    },
    /// 不点击，直接迁移
    Advance(AutomationState),
    Wait(WaitReason),
    Fail(AutomationError),
}

fn loop_or_empty(guard: &LoopGuard, exhausted: Option<&MenuOption>) -> AutomationError {
    match exhausted {
        Some(option) => AutomationError::LoopDetected {
            label: option.label.clone(),
            count: guard.count(&option.label),
        },
        None => AutomationError::NoEligibleOption,
    }
}

/// Idle → AwaitingList：按策略选择第一次点击
pub fn decide_entry(
    strategy: SelectionStrategy,
    rules: &SelectionRules,
    snapshot: &MenuSnapshot,
    guard: &LoopGuard,
) -> Decision {
    if snapshot.is_empty() {
        return Decision::Wait(WaitReason::EmptyKeyboard);
    }
    let eligible = |o: &MenuOption| !guard.is_exhausted(&o.label);
    let first_available = || snapshot.options().find(|o| eligible(o));

    let chosen = match strategy {
        SelectionStrategy::FirstAvailable => first_available().map(|o| (o, "first-available")),
        SelectionStrategy::KeywordMatch => first_match(&rules.entry, snapshot.options(), eligible)
            .map(|(_, o)| (o, "keyword-match"))
            .or_else(|| {
                tracing::warn!("No option matched entry keywords, falling back to first available");
                first_available().map(|o| (o, "first-available"))
            }),
        SelectionStrategy::InvokeAll => {
            let options: Vec<MenuOption> = snapshot.options().filter(|o| eligible(o)).cloned().collect();
            if options.is_empty() {
                return Decision::Fail(loop_or_empty(guard, snapshot.options().next()));
            }
            return Decision::InvokeAll {
                options,
                next: AutomationState::AwaitingList,
            };
        }
    };

    match chosen {
        Some((option, reason)) => Decision::Invoke {
            option: option.clone(),
            next: AutomationState::AwaitingList,
            reason,
        },
        None => Decision::Fail(loop_or_empty(guard, snapshot.options().next())),
    }
}

/// AwaitingList：还带列表标记就点第一个列表项，否则迁移到 AwaitingDetails（本次不点列表项）
pub fn decide_list(rules: &SelectionRules, snapshot: &MenuSnapshot, guard: &LoopGuard) -> Decision {
    if snapshot.is_empty() {
        return Decision::Wait(WaitReason::EmptyKeyboard);
    }
    let list_options: Vec<&MenuOption> = snapshot
        .options()
        .filter(|o| rules.is_list_option(&o.label))
        .collect();
    if list_options.is_empty() {
        return Decision::Advance(AutomationState::AwaitingDetails);
    }

    match list_options.iter().find(|o| !guard.is_exhausted(&o.label)) {
        Some(option) => Decision::Invoke {
            option: (*option).clone(),
            next: AutomationState::AwaitingList,
            reason: "list-marker",
        },
        None => Decision::Fail(loop_or_empty(guard, list_options.first().copied())),
    }
}

/// AwaitingDetails：确认匹配 > 非导航兜底 > 失败
pub fn decide_details(rules: &SelectionRules, snapshot: &MenuSnapshot, guard: &LoopGuard) -> Decision {
    if snapshot.is_empty() {
        return Decision::Wait(WaitReason::EmptyKeyboard);
    }
    if snapshot.options().any(|o| rules.is_list_option(&o.label)) {
        return Decision::Wait(WaitReason::ListMarkersReappeared);
    }

    let eligible = |o: &MenuOption| !guard.is_exhausted(&o.label);
    if let Some((_, option)) = first_match(&rules.confirmation, snapshot.options(), eligible) {
        return Decision::Invoke {
            option: option.clone(),
            next: AutomationState::Completed,
            reason: "confirmation",
        };
    }

    // 有确认候选但全部被循环保护拒绝：不再退到兜底选项
    let exhausted_confirmation = snapshot
        .options()
        .find(|o| rules.confirmation.iter().any(|m| m.matches(&o.label)));
    if exhausted_confirmation.is_some() {
        return Decision::Fail(loop_or_empty(guard, exhausted_confirmation));
    }

    let navigation_free: Vec<&MenuOption> = snapshot
        .options()
        .filter(|o| !rules.is_excluded(&o.label))
        .collect();
    if let Some(option) = navigation_free.iter().find(|o| eligible(o)) {
        return Decision::Invoke {
            option: (*option).clone(),
            next: AutomationState::Completed,
            reason: "fallback",
        };
    }

    // 兜底候选都被拒绝时报告循环，否则是真的没有可选项
    Decision::Fail(loop_or_empty(guard, navigation_free.first().copied()))
}
